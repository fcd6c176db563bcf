//! Line-oriented control feed.
//!
//! Each input line is one JSON control message, e.g.
//! `{"address": "/trigger", "args": [0.5, 0.5]}`. Messages are applied in
//! order and each waits for its proximity pass before the next line is read.
//! Malformed or rejected messages are logged and skipped.

use anyhow::Context;
use position_system::{ControlMessage, PositionError, ProximityHandle};
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, info, warn};

/// Counters for one feed run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub applied: usize,
    pub rejected: usize,
}

/// Applies control messages read from `reader` until it is exhausted.
///
/// Stops early with `ServiceStopped` if the proximity service goes away.
pub async fn run_control_feed<R>(reader: R, proximity: ProximityHandle) -> anyhow::Result<FeedStats>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut stats = FeedStats::default();

    while let Some(line) = lines
        .next_line()
        .await
        .context("reading control feed")?
    {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let command = match ControlMessage::parse(line).and_then(ControlMessage::into_command) {
            Ok(command) => command,
            Err(e) => {
                warn!("🎛️ Ignoring control message {:?}: {}", line, e);
                stats.rejected += 1;
                continue;
            }
        };

        debug!("🎛️ Applying {:?}", command);
        match proximity.apply(command).await {
            Ok(report) => {
                stats.applied += 1;
                info!(
                    "🎛️ Trigger update applied: {} evaluated, {} activated, {} deactivated",
                    report.evaluated, report.activated, report.deactivated
                );
            }
            Err(PositionError::ServiceStopped) => return Err(PositionError::ServiceStopped.into()),
            Err(e) => {
                warn!("🎛️ Trigger update rejected: {}", e);
                stats.rejected += 1;
            }
        }
    }

    info!(
        "🎛️ Control feed closed ({} applied, {} rejected)",
        stats.applied, stats.rejected
    );
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use position_system::{
        create_position_store, spawn_proximity_service, Point, Proximity, ProximityPolicy,
        TriggerSet,
    };
    use serde_json::json;
    use std::sync::Arc;
    use tokio::io::BufReader;

    #[tokio::test]
    async fn test_feed_applies_messages_in_order() {
        let store = create_position_store();
        store
            .configure(&json!({ "xRange": [0, 1], "yRange": [0, 1] }))
            .unwrap();
        let player = store.attach_client(position_system::ClientId::new()).unwrap();
        player.set_position(0.5, 0.5, None).unwrap();

        let area = store.area().unwrap();
        let (proximity, _task) = spawn_proximity_service(
            Arc::clone(&store),
            TriggerSet::new(&area, 0.1),
            ProximityPolicy::LastWins,
        )
        .unwrap();

        let input = concat!(
            "{\"address\":\"/trigger\",\"args\":[0.5,0.55]}\n",
            "\n",
            "not json\n",
            "{\"address\":\"/volume\",\"args\":[1]}\n",
            "{\"address\":\"/radius\",\"args\":[-2]}\n",
            "{\"address\":\"/radius\",\"args\":[{\"type\":\"f\",\"value\":0.2}]}\n",
        );
        let stats = run_control_feed(BufReader::new(input.as_bytes()), proximity.clone())
            .await
            .unwrap();

        assert_eq!(stats, FeedStats { applied: 2, rejected: 3 });
        let trigger_set = proximity.trigger_set();
        assert_eq!(trigger_set.radius, 0.2);
        assert_eq!(trigger_set.triggers, vec![Point::new(0.5, 0.55)]);
        assert!(matches!(
            player.proximity(),
            Some(Proximity::Active { distance }) if (distance - 0.25).abs() < 1e-9
        ));
    }

    #[tokio::test]
    async fn test_feed_reports_stopped_service() {
        let store = create_position_store();
        store.configure(&json!(null)).unwrap();
        let area = store.area().unwrap();
        let (proximity, task) =
            spawn_proximity_service(store, TriggerSet::new(&area, 0.1), ProximityPolicy::Nearest)
                .unwrap();
        task.abort();
        let _ = task.await;

        let result =
            run_control_feed(BufReader::new(&b"{\"address\":\"/clear\"}\n"[..]), proximity).await;
        let error = result.unwrap_err();
        assert!(matches!(
            error.downcast_ref::<PositionError>(),
            Some(PositionError::ServiceStopped)
        ));
    }
}
