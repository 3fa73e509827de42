//! Data path properties, exercised through `FilterDevice` and a fake controller

mod common;

use std::sync::Arc;

use att_filter_core::{
    BulkTransfer, ConfigFlags, Direction, FilterDevice, ForwardMode, IoRequest, MemoryDescriptor,
    PassOutcome, Pipeline, Status, TransferBuffer,
};

use common::*;

struct Harness {
    flags: Arc<ConfigFlags>,
    sink: Arc<RecordingSink>,
    controller: Arc<FakeController>,
    device: FilterDevice,
}

fn harness_with(controller: FakeController) -> Harness {
    let flags = Arc::new(ConfigFlags::new());
    let sink = Arc::new(RecordingSink::default());
    let controller = Arc::new(controller);
    let pipeline = Arc::new(Pipeline::new(Arc::clone(&flags), sink.clone()));
    let device = FilterDevice::new(pipeline, controller.clone(), ForwardMode::WithCompletion);
    Harness {
        flags,
        sink,
        controller,
        device,
    }
}

fn harness() -> Harness {
    harness_with(FakeController::new())
}

/// Read request the controller will fill with `frame`
async fn read(h: &Harness, frame: &[u8]) -> (Vec<u8>, usize, PassOutcome) {
    h.controller.queue_response(frame);
    let out = h
        .device
        .dispatch_traced(bulk(1, Direction::In, &[0u8; 64]))
        .await;
    let (bytes, len) = delivered(&out.completed.request);
    (bytes, len, out.inbound.expect("inbound pass"))
}

#[tokio::test(flavor = "multi_thread")]
async fn battery_write_reaches_controller_as_hid_report_write() {
    let h = harness();
    h.device.dispatch(bulk(1, Direction::Out, &OUT_WRITE)).await;
    assert_eq!(h.controller.wire(), vec![OUT_WRITE_REWRITTEN.to_vec()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn battery_cccd_reaches_controller_as_hid_cccd() {
    let h = harness();
    h.device.dispatch(bulk(1, Direction::Out, &OUT_CCCD)).await;
    assert_eq!(h.controller.wire(), vec![OUT_CCCD_REWRITTEN.to_vec()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn short_notification_relabelled_and_dumped_on_one_line() {
    let h = harness();
    h.flags.set_trace_inbound(true);
    let (bytes, len, outcome) = read(&h, &IN_NOTIFY).await;
    assert!(outcome.is_rewritten());
    assert_eq!(len, 13);
    assert_eq!(bytes[9], 0x2B);
    let mut expected = IN_NOTIFY;
    expected[9] = 0x2B;
    assert_eq!(bytes, expected);
    assert_eq!(
        h.sink.lines(),
        vec!["DATA IN: 80 20 09 00 05 00 04 00 1b 2b 00 00 02".to_string()]
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn long_notification_clamped_with_header_fix() {
    let h = harness();
    h.flags.set_fix_headers(true);
    for n in [31usize, 44, 64] {
        let (bytes, len, outcome) = read(&h, &long_notify(n)).await;
        assert_eq!(
            outcome,
            PassOutcome::Rewritten {
                template: "long-hid-notify-to-battery",
                truncated_to: Some(30)
            },
            "length {n}"
        );
        assert_eq!(len, 30);
        assert_eq!(bytes[2], 0x1A);
        assert_eq!(bytes[4], 0x16);
        assert_eq!(bytes[9], 0x2B);
        assert_eq!(&bytes[11..], &long_notify(n)[11..30]);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn long_notification_without_header_fix_only_relabelled() {
    let h = harness();
    let frame = long_notify(44);
    let (bytes, len, _) = read(&h, &frame).await;
    assert_eq!(len, 44);
    let mut expected = frame.clone();
    expected[9] = 0x2B;
    assert_eq!(bytes, expected);
}

#[tokio::test(flavor = "multi_thread")]
async fn lengths_between_24_and_31_pass_through() {
    let h = harness();
    h.flags.set_fix_headers(true);
    for n in 25..=30 {
        let frame = long_notify(n);
        let (bytes, len, outcome) = read(&h, &frame).await;
        assert_eq!(outcome, PassOutcome::NoMatch, "length {n}");
        assert_eq!((bytes, len), (frame, n));
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn any_single_required_byte_difference_suppresses_rewrite() {
    let h = harness();
    h.flags.set_fix_headers(true);

    for template in [&OUT_WRITE[..], &OUT_CCCD[..]] {
        for i in 0..template.len() {
            let mut bytes = template.to_vec();
            bytes[i] = bytes[i].wrapping_add(1);
            h.device.dispatch(bulk(1, Direction::Out, &bytes)).await;
            let wire = h.controller.wire();
            assert_eq!(wire.last(), Some(&bytes), "outbound offset {i}");
        }
    }

    // Offsets 2 and 4 of the inbound prefix are wildcards
    for frame in [IN_NOTIFY.to_vec(), long_notify(40)] {
        for i in (0..11).filter(|i| *i != 2 && *i != 4) {
            let mut bytes = frame.clone();
            bytes[i] = bytes[i].wrapping_add(1);
            let (got, len, outcome) = read(&h, &bytes).await;
            assert_eq!(outcome, PassOutcome::NoMatch, "inbound offset {i}");
            assert_eq!((got, len), (bytes.clone(), bytes.len()));
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn templates_only_fire_in_their_own_direction() {
    let h = harness();
    // Inbound-shaped bytes sent outbound
    h.device.dispatch(bulk(1, Direction::Out, &IN_NOTIFY)).await;
    assert_eq!(h.controller.wire(), vec![IN_NOTIFY.to_vec()]);

    // Outbound-shaped bytes coming back inbound
    let (bytes, _, outcome) = read(&h, &OUT_WRITE).await;
    assert_eq!(outcome, PassOutcome::NoMatch);
    assert_eq!(bytes, OUT_WRITE);
}

#[tokio::test(flavor = "multi_thread")]
async fn unresolved_buffer_forwarded_unchanged_without_dump() {
    let h = harness();
    h.flags.set_trace_outbound(true);
    h.flags.set_trace_inbound(true);

    let descriptor = MemoryDescriptor::paged_out(OUT_WRITE.to_vec());
    let request = IoRequest::bulk(
        9,
        BulkTransfer::new(
            Direction::Out,
            TransferBuffer::descriptor(descriptor.clone()),
            OUT_WRITE.len(),
        ),
    );
    let out = h.device.dispatch_traced(request).await;
    assert_eq!(out.outbound, PassOutcome::Unresolved);
    assert_eq!(descriptor.to_vec(), OUT_WRITE);
    assert_eq!(out.completed.status, Status::SUCCESS);

    let empty = IoRequest::bulk(
        10,
        BulkTransfer::new(Direction::In, TransferBuffer::empty(), 13),
    );
    let out = h.device.dispatch_traced(empty).await;
    assert_eq!(out.inbound, Some(PassOutcome::Unresolved));
    assert!(h.sink.lines().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn failed_completion_status_and_payload_untouched() {
    let h = harness_with(FakeController::new().with_status(Status::CANCELLED));
    h.flags.set_trace_inbound(true);
    h.controller.queue_response(&IN_NOTIFY);
    let out = h
        .device
        .dispatch_traced(bulk(3, Direction::In, &[0u8; 64]))
        .await;
    assert_eq!(out.completed.status, Status::CANCELLED);
    assert_eq!(out.inbound, Some(PassOutcome::Bypassed));
    assert_eq!(delivered(&out.completed.request).0, IN_NOTIFY);
    assert!(h.sink.lines().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_forward_reports_lower_status() {
    let flags = Arc::new(ConfigFlags::new());
    let pipeline = Arc::new(Pipeline::new(flags, Arc::new(RecordingSink::default())));
    let device = FilterDevice::new(
        pipeline,
        Arc::new(DisconnectedController),
        ForwardMode::WithCompletion,
    );
    let completed = device.dispatch(bulk(4, Direction::Out, &OUT_WRITE)).await;
    assert_eq!(completed.status, Status::DEVICE_NOT_CONNECTED);
    assert_eq!(completed.request.id, 4);
    // The outbound rewrite already happened before the lower layer refused it
    assert_eq!(delivered(&completed.request).0, OUT_WRITE_REWRITTEN);
}

#[tokio::test(flavor = "multi_thread")]
async fn send_and_forget_never_inspects_responses() {
    let flags = Arc::new(ConfigFlags::new());
    let controller = Arc::new(FakeController::new());
    let pipeline = Arc::new(Pipeline::new(flags, Arc::new(RecordingSink::default())));
    let device = FilterDevice::new(pipeline, controller.clone(), ForwardMode::SendAndForget);

    controller.queue_response(&IN_NOTIFY);
    let out = device.dispatch_traced(bulk(1, Direction::In, &[0u8; 64])).await;
    assert!(out.inbound.is_none());
    assert_eq!(delivered(&out.completed.request).0, IN_NOTIFY);

    // Outbound rewrites still apply
    device.dispatch(bulk(2, Direction::Out, &OUT_CCCD)).await;
    assert_eq!(controller.wire(), vec![OUT_CCCD_REWRITTEN.to_vec()]);
}

#[tokio::test(flavor = "multi_thread")]
async fn unavailable_trace_channel_does_not_affect_rewrites() {
    let flags = Arc::new(ConfigFlags::new());
    flags.set_trace_inbound(true);
    flags.set_trace_outbound(true);
    let controller = Arc::new(FakeController::new());
    let pipeline = Arc::new(Pipeline::new(Arc::clone(&flags), Arc::new(UnavailableSink)));
    let device = FilterDevice::new(pipeline, controller.clone(), ForwardMode::WithCompletion);

    device.dispatch(bulk(1, Direction::Out, &OUT_WRITE)).await;
    assert_eq!(controller.wire(), vec![OUT_WRITE_REWRITTEN.to_vec()]);

    controller.queue_response(&IN_NOTIFY);
    let completed = device.dispatch(bulk(2, Direction::In, &[0u8; 64])).await;
    assert_eq!(delivered(&completed.request).0[9], 0x2B);
}

#[tokio::test(flavor = "multi_thread")]
async fn outbound_dump_wraps_every_16_bytes() {
    let h = harness();
    h.flags.set_trace_outbound(true);
    let bytes: Vec<u8> = (0..40).collect();
    h.device.dispatch(bulk(1, Direction::Out, &bytes)).await;
    let lines = h.sink.lines();
    assert_eq!(lines.len(), 3);
    assert!(lines[0].starts_with("DATA OUT: 00 01 02"));
    assert!(lines[2].ends_with("25 26 27"));
    assert_eq!(h.sink.count(Direction::In), 0);
}
