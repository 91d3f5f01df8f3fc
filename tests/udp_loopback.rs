//! Sender and receiver talking over a loopback socket.

use anyhow::Result;
use futures::StreamExt;
use livr::{Livr, Point, ReportRate, StreamConfig};
use std::time::Duration;

const MS: u64 = 1_000_000;

async fn loopback() -> Result<(livr::ReceiverConnection, livr::DatagramSender)> {
    let mut config = StreamConfig::default();
    config.receiver.bind_addr = "127.0.0.1:0".to_string();
    config.frame.period_s = 0.05;

    let connection = Livr::listen(&config).await?;
    let addr = connection.local_addr().ok_or_else(|| anyhow::anyhow!("no bound address"))?;
    config.sender.target_addr = addr.to_string();
    let sender = Livr::sender(&config)?;
    Ok((connection, sender))
}

fn ring(count: usize, radius: f32) -> Vec<Point> {
    (0..count)
        .map(|i| {
            let angle = i as f32 * std::f32::consts::TAU / count as f32;
            Point::new(radius * angle.cos(), radius * angle.sin(), 0.0, 200)
        })
        .collect()
}

#[tokio::test]
async fn scans_arrive_as_frames() -> Result<()> {
    let _ = tracing_subscriber::fmt::try_init();

    let (mut connection, mut sender) = loopback().await?;
    let scans: Vec<Vec<Point>> = (1..=4).map(|r| ring(512, r as f32)).collect();

    for (n, scan) in scans.iter().enumerate() {
        let report = sender.send_points(n as u64 * 50 * MS, scan)?;
        assert!(report.is_complete());
        assert_eq!(report.datagrams_sent, 5);
        // Pace the sender so loopback buffers never fill
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // Each scan closes the one before it; the last is flushed on shutdown
    let mut frames = Vec::new();
    for _ in 0..3 {
        frames.extend(connection.next_frame_timeout(Duration::from_secs(2)).await?);
    }
    connection.shutdown().await?;
    frames.extend(connection.next_frame().await);

    assert_eq!(frames.len(), 4);
    for (frame, scan) in frames.iter().zip(&scans) {
        let expected: Vec<[f32; 3]> = scan.iter().map(Point::xyz).collect();
        assert_eq!(frame.points, expected);
        assert_eq!(frame.packet_count, 5);
    }

    let stats = connection.current_stats();
    assert_eq!(stats.decoder.valid_packets, 20);
    assert_eq!(stats.decoder.checksum_failures, 0);
    assert_eq!(stats.accumulator.seq_gaps, 0);

    let tx = sender.stats();
    assert_eq!(tx.tx_packets, 20);
    assert_eq!(tx.tx_points, 2048);
    assert_eq!(tx.dropped_packets, 0);
    Ok(())
}

#[tokio::test]
async fn stats_stream_reports_progress() -> Result<()> {
    let (connection, mut sender) = loopback().await?;
    let mut updates = connection.stats_updates(ReportRate::EveryUpdate);

    // Initial value before anything arrives
    let initial = updates.next().await.ok_or_else(|| anyhow::anyhow!("stream ended"))?;
    assert_eq!(initial.frames_delivered, 0);

    sender.send_points(0, &ring(10, 1.0))?;
    sender.send_points(60 * MS, &ring(10, 1.0))?;

    let update = tokio::time::timeout(Duration::from_secs(2), updates.next())
        .await?
        .ok_or_else(|| anyhow::anyhow!("stream ended"))?;
    assert_eq!(update.accumulator.frames_built, 1);
    assert_eq!(update.frames_delivered, 1);
    Ok(())
}

#[tokio::test]
async fn oversized_scan_is_refused_before_sending() -> Result<()> {
    let (connection, mut sender) = loopback().await?;
    assert!(sender.send_points(0, &ring(4096, 1.0)).is_err());
    assert_eq!(sender.stats().tx_packets, 0);
    assert_eq!(connection.live_stats().decoder.total_packets, 0);
    Ok(())
}
