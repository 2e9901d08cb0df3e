/// Integration tests for the access workflow driven by the recognition engine
use access_control::{
    AccessController, AccessDecision, AccessStore, AuditAction, DenialReason, EventWindow, Grant,
    InMemoryAccessStore, MemoryAuditSink, PlateSource, StaticCalendar, Verdict,
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveDateTime};
use common::access::{AccessAction, AccessRequest};
use common::plates::ImageInput;
use image::{DynamicImage, GrayImage, Luma};
use plate_engine::{EngineConfig, PlateRecognizer, RecognitionPolicy, RecognitionService, ScriptedReader};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

fn frame() -> ImageInput {
    let img = DynamicImage::ImageLuma8(GrayImage::from_fn(60, 20, |x, _| {
        Luma([if x % 6 < 3 { 25 } else { 215 }])
    }));
    let mut bytes = Vec::new();
    img.write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    ImageInput::bytes(bytes)
}

fn sunday(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 3, 17)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

fn request(action: &str) -> AccessRequest {
    AccessRequest {
        image: frame(),
        action: AccessAction::from_request(action),
        guard_id: "guard-7".to_string(),
    }
}

fn early_exit_service(script: Vec<Vec<&str>>) -> RecognitionService {
    let config = EngineConfig {
        policy: RecognitionPolicy::EarlyExit,
        ..Default::default()
    };
    let recognizer = PlateRecognizer::new(config, Box::new(ScriptedReader::new(script))).unwrap();
    RecognitionService::new(recognizer)
}

#[tokio::test]
async fn test_recognized_vehicle_enters_and_leaves() {
    // One perfect read per request
    let service = early_exit_service(vec![vec!["ABC123"], vec!["ABC123"]]);
    let store = Arc::new(InMemoryAccessStore::with_vehicles(["ABC123"]));
    let audit = Arc::new(MemoryAuditSink::new());
    let controller = AccessController::new(
        Arc::new(service),
        store.clone(),
        Arc::new(StaticCalendar::default()),
        audit.clone(),
    );

    let entry = controller.process_at(request("entrada"), sunday(9)).await.unwrap();
    assert_eq!(entry.verdict, Verdict::Authorized(Grant::EntryRecorded));
    assert_eq!(entry.plate.as_deref(), Some("ABC123"));

    let exit = controller.process_at(request("salida"), sunday(17)).await.unwrap();
    assert_eq!(exit.verdict, Verdict::Authorized(Grant::ExitRecorded));

    let records = store.records().await;
    assert_eq!(records.len(), 1);
    assert!(records[0].exited_at.is_some());
    assert_eq!(store.open_access("ABC123").await.unwrap(), None);

    let audit = audit.entries().await;
    assert_eq!(audit.len(), 2);
    assert_eq!(audit[0].action, AuditAction::VehicleEntry);
    assert_eq!(audit[1].action, AuditAction::VehicleExit);
    assert_eq!(audit[1].guard_id, "guard-7");
}

#[tokio::test]
async fn test_unreadable_frame_is_denied() {
    // Nothing legible on any variant
    let service = early_exit_service(vec![]);
    let controller = AccessController::new(
        Arc::new(service),
        Arc::new(InMemoryAccessStore::with_vehicles(["ABC123"])),
        Arc::new(StaticCalendar::default()),
        Arc::new(MemoryAuditSink::new()),
    );

    let decision = controller.process_at(request("entrada"), sunday(9)).await.unwrap();
    assert_eq!(decision.verdict, Verdict::Denied(DenialReason::Illegible));
    assert!(!decision.is_authorized());
}

#[tokio::test]
async fn test_guest_only_admitted_during_event() {
    let service = early_exit_service(vec![vec!["XYZ987"], vec!["XYZ987"]]);
    let store = Arc::new(InMemoryAccessStore::new());
    let event = EventWindow::new("Open house", sunday(10), sunday(14)).unwrap();
    let controller = AccessController::new(
        Arc::new(service),
        store.clone(),
        Arc::new(StaticCalendar::new(vec![event])),
        Arc::new(MemoryAuditSink::new()),
    );

    let before = controller.process_at(request("entrada"), sunday(9)).await.unwrap();
    assert_eq!(before.verdict, Verdict::Denied(DenialReason::Unregistered));

    let during = controller.process_at(request("entrada"), sunday(11)).await.unwrap();
    assert_eq!(during.verdict, Verdict::Authorized(Grant::GuestEntry));
    assert!(store.is_guest("XYZ987").await);
}

/// Plate source that takes a while, so concurrent requests overlap
struct SlowSource;

#[async_trait]
impl PlateSource for SlowSource {
    async fn read_plate(&self, _image: ImageInput) -> Option<String> {
        tokio::time::sleep(Duration::from_millis(10)).await;
        Some("ABC123".to_string())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_entries_record_once() {
    let store = Arc::new(InMemoryAccessStore::with_vehicles(["ABC123"]));
    let controller = AccessController::new(
        Arc::new(SlowSource),
        store.clone(),
        Arc::new(StaticCalendar::default()),
        Arc::new(MemoryAuditSink::new()),
    );

    let mut handles = Vec::new();
    for _ in 0..6 {
        let controller = controller.clone();
        handles.push(tokio::spawn(async move {
            controller.process_at(request("entrada"), sunday(9)).await
        }));
    }

    let mut decisions: Vec<AccessDecision> = Vec::new();
    for handle in handles {
        decisions.push(handle.await.unwrap().unwrap());
    }

    let authorized = decisions.iter().filter(|d| d.is_authorized()).count();
    assert_eq!(authorized, 1);
    assert!(decisions
        .iter()
        .filter(|d| !d.is_authorized())
        .all(|d| d.verdict == Verdict::Denied(DenialReason::AlreadyInside)));
    assert_eq!(store.records().await.len(), 1);
}
