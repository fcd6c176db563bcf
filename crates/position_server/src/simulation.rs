//! Simulated players.
//!
//! Each simulated player goes through the same plugin lifecycle as a real
//! client and is placed at a random position, which is enough to exercise
//! proximity passes without any connected clients.

use position_system::{
    ClientId, PluginOptions, PositionPlugin, PositionResult, PositionStore, RandomPosition,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Starts `count` players at random positions and waits until each is ready.
pub async fn spawn_players(
    store: &Arc<PositionStore>,
    count: usize,
    attach_timeout: Duration,
) -> PositionResult<Vec<PositionPlugin>> {
    let mut players = Vec::with_capacity(count);

    for _ in 0..count {
        let options = PluginOptions::default()
            .with_initial_position(RandomPosition)
            .with_attach_timeout(attach_timeout);
        let mut player = PositionPlugin::new(ClientId::new(), options);
        player.start(store).await?;
        player.ready().await?;

        let position = player.get_position()?;
        info!(
            "🤖 Simulated player {} placed at ({:.3}, {:.3})",
            player.client_id(),
            position.x.unwrap_or_default(),
            position.y.unwrap_or_default()
        );
        players.push(player);
    }

    Ok(players)
}

/// Detaches every simulated player.
pub fn stop_players(players: &mut [PositionPlugin]) {
    for player in players.iter_mut() {
        player.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use position_system::{create_position_store, PositionError};
    use serde_json::json;

    #[tokio::test]
    async fn test_spawned_players_are_placed_inside_area() {
        let store = create_position_store();
        store
            .configure(&json!({ "xRange": [10, 20], "yRange": [-5, 0] }))
            .unwrap();

        let mut players = spawn_players(&store, 3, Duration::from_secs(1)).await.unwrap();
        assert_eq!(store.client_count(), 3);

        for player in &players {
            let position = player.get_position().unwrap();
            assert!((10.0..=20.0).contains(&position.x.unwrap()));
            assert!((-5.0..=0.0).contains(&position.y.unwrap()));
        }

        stop_players(&mut players);
        assert_eq!(store.client_count(), 0);
    }

    #[tokio::test]
    async fn test_spawn_without_area_fails() {
        let store = create_position_store();
        let result = spawn_players(&store, 1, Duration::from_millis(10)).await;
        assert!(matches!(result, Err(PositionError::ConfigUnavailable(_))));
    }
}
