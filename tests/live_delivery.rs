use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use framefeed::pipeline::delivery::MappedSample;
use framefeed::pipeline::{dispatch, FrameRingBuffer, HandlerResult, SampleDelivery, SampleFlow};
use framefeed::{Frame, PixelFormat};

fn sample(data: &[u8]) -> Result<MappedSample<'_>, &'static str> {
    Ok(MappedSample {
        data,
        width: 1,
        height: 1,
        pts: None,
    })
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn slow_handler_drops_oldest_frames() {
    const FRAMES: u8 = 50;

    let output = Arc::new(FrameRingBuffer::new(1));
    let delivery = Arc::new(SampleDelivery::new(output.clone(), PixelFormat::Png));

    let streaming = {
        let delivery = delivery.clone();
        let output = output.clone();
        std::thread::spawn(move || {
            for i in 0..FRAMES {
                assert_eq!(delivery.deliver(sample(&[i])), SampleFlow::Ok);
                assert!(output.len() <= 1);
                std::thread::sleep(Duration::from_millis(2));
            }
            output.close();
        })
    };

    let mut seen = Vec::new();
    let mut handler = |frame: Frame| -> HandlerResult {
        seen.push(frame.sequence());
        std::thread::sleep(Duration::from_millis(15));
        Ok(())
    };

    let stats = dispatch(&output, &mut handler, &CancellationToken::new()).await;
    streaming.join().unwrap();

    // Skipped, never reordered or duplicated
    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(stats.handled, seen.len() as u64);

    let buffer = output.stats();
    assert_eq!(buffer.written, FRAMES as usize);
    assert_eq!(buffer.read + buffer.dropped, FRAMES as usize);
    assert!(buffer.dropped > 0);
    assert!(stats.handled < FRAMES as u64);
}

#[tokio::test]
async fn map_failure_is_isolated_to_one_sample() {
    let output = Arc::new(FrameRingBuffer::new(1));
    let delivery = SampleDelivery::new(output.clone(), PixelFormat::Png);

    let mut received = Vec::new();
    let mut handler = |frame: Frame| -> HandlerResult {
        received.push(frame);
        Ok(())
    };

    assert_eq!(delivery.deliver::<&str>(Err("unmappable")), SampleFlow::Error);
    assert_eq!(delivery.deliver(sample(b"next")), SampleFlow::Ok);
    output.close();

    let stats = dispatch(&output, &mut handler, &CancellationToken::new()).await;
    assert_eq!(stats.handled, 1);
    assert_eq!(received.len(), 1);
    assert_eq!(&received[0].data[..], b"next");
    assert_eq!(received[0].sequence(), 0);
    assert_eq!(delivery.failures(), 1);
}

#[tokio::test]
async fn cancellation_ends_dispatch_while_idle() {
    let output = Arc::new(FrameRingBuffer::new(1));
    let cancel = CancellationToken::new();

    let canceller = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        canceller.cancel();
    });

    let mut handler = |_frame: Frame| -> HandlerResult { Ok(()) };
    let stats = dispatch(&output, &mut handler, &cancel).await;
    assert_eq!(stats.handled, 0);
}
