//! End-to-end session tests against the mock native library.

#[cfg(test)]
mod session_tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::{Duration, Instant};
    use tofcam::testing::{synthetic_depth_data, MockLibrary, MockPlatform, MockUsbHost};
    use tofcam::{
        CameraError, CameraEvent, CameraSession, EventKind, RecordingConfig, SessionManager,
        SessionSource, StreamId, UsbDevice,
    };

    fn open_pre_granted(library: Arc<MockLibrary>) -> CameraSession {
        let host = Arc::new(
            MockUsbHost::new()
                .with_device(UsbDevice::new("/dev/bus/usb/001/004", 0x1C28, 0xC012))
                .pre_granted(),
        );
        let manager = SessionManager::new(library, "");

        let (tx, rx) = crossbeam_channel::bounded(1);
        let error_tx = tx.clone();
        manager.create_session(
            &MockPlatform::new(host),
            move |session| {
                tx.send(Ok(session)).ok();
            },
            move |error| {
                error_tx.send(Err(error)).ok();
            },
        );
        rx.recv_timeout(Duration::from_secs(5))
            .expect("creation reported")
            .expect("session opened")
    }

    #[test]
    fn test_capture_three_frames_then_close() {
        let library = Arc::new(MockLibrary::new());
        let session = open_pre_granted(library.clone());
        let control = library.last_opened().unwrap();

        session.initialize().unwrap();
        let timestamps = Arc::new(Mutex::new(Vec::new()));
        {
            let timestamps = timestamps.clone();
            session
                .register_depth_data_listener(move |frame| {
                    timestamps.lock().unwrap().push(frame.timestamp);
                })
                .unwrap();
        }
        session.start_capture().unwrap();

        for frame_number in 0..3 {
            assert!(control.deliver_depth_data(synthetic_depth_data(frame_number, 8, 8)));
        }
        assert!(control.flush());
        assert_eq!(*timestamps.lock().unwrap(), vec![0, 200_000, 400_000]);

        session.stop_capture().unwrap();
        session.close().unwrap();
        assert_eq!(control.finalize_count(), 1);

        assert!(!control.deliver_depth_data(synthetic_depth_data(3, 8, 8)));
        assert_eq!(timestamps.lock().unwrap().len(), 3);
        assert_eq!(control.delivered(), 3);

        drop(session);
        assert_eq!(control.finalize_count(), 1);
    }

    #[test]
    fn test_frames_before_capture_are_not_delivered() {
        let library = Arc::new(MockLibrary::new());
        let session = open_pre_granted(library.clone());
        let control = library.last_opened().unwrap();
        let count = Arc::new(AtomicUsize::new(0));

        session.initialize().unwrap();
        {
            let count = count.clone();
            session
                .register_depth_data_listener(move |_| {
                    count.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }

        control.deliver_depth_data(synthetic_depth_data(0, 4, 4));
        control.flush();
        assert_eq!(count.load(Ordering::SeqCst), 0);

        session.start_capture().unwrap();
        control.deliver_depth_data(synthetic_depth_data(1, 4, 4));
        control.flush();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_listener_cannot_call_back_into_session() {
        let library = Arc::new(MockLibrary::new());
        let session = Arc::new(open_pre_granted(library.clone()));
        let control = library.last_opened().unwrap();
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        session.initialize().unwrap();
        {
            let weak = Arc::downgrade(&session);
            session
                .register_depth_data_listener(move |_| {
                    if let Some(session) = weak.upgrade() {
                        result_tx.send(session.stop_capture()).ok();
                    }
                })
                .unwrap();
        }
        session.start_capture().unwrap();

        control.deliver_depth_data(synthetic_depth_data(0, 4, 4));
        control.flush();

        let result = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(CameraError::LogicError(_))));
        assert!(session.is_capturing());
        session.close().unwrap();
    }

    #[test]
    fn test_listener_may_call_another_session() {
        let library = Arc::new(MockLibrary::new());
        let first = open_pre_granted(library.clone());
        let first_control = library.last_opened().unwrap();
        let second = Arc::new(open_pre_granted(library.clone()));
        let (result_tx, result_rx) = crossbeam_channel::unbounded();

        first.initialize().unwrap();
        {
            let second = second.clone();
            first
                .register_depth_data_listener(move |_| {
                    result_tx.send(second.camera_name()).ok();
                })
                .unwrap();
        }
        first.start_capture().unwrap();
        first_control.deliver_depth_data(synthetic_depth_data(0, 4, 4));

        let result = result_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(result, Ok("PICOFLEXX".to_string()));

        first.close().unwrap();
        second.close().unwrap();
    }

    #[test]
    fn test_last_owner_dropped_inside_listener_destroys_camera() {
        let library = Arc::new(MockLibrary::new());
        let session = Arc::new(open_pre_granted(library.clone()));
        let control = library.last_opened().unwrap();
        let (held_tx, held_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        session.initialize().unwrap();
        {
            let weak = Arc::downgrade(&session);
            session
                .register_depth_data_listener(move |_| {
                    if let Some(session) = weak.upgrade() {
                        held_tx.send(()).ok();
                        release_rx.recv().ok();
                        drop(session);
                    }
                })
                .unwrap();
        }
        session.start_capture().unwrap();

        assert!(control.deliver_depth_data(synthetic_depth_data(0, 4, 4)));
        held_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        drop(session);
        release_tx.send(()).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while control.finalize_count() == 0 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        assert_eq!(control.finalize_count(), 1);
        assert!(!control.is_capturing());
        assert!(!control.deliver_depth_data(synthetic_depth_data(1, 4, 4)));
        assert_eq!(control.delivered(), 1);
    }

    #[test]
    fn test_record_stop_fires_once_per_recording() {
        let library = Arc::new(MockLibrary::new());
        let session = open_pre_granted(library.clone());
        let control = library.last_opened().unwrap();
        let stops = Arc::new(Mutex::new(Vec::new()));

        session.initialize().unwrap();
        session.register_depth_data_listener(|_| {}).unwrap();
        {
            let stops = stops.clone();
            session
                .register_record_stop_listener(move |frames| {
                    stops.lock().unwrap().push(*frames);
                })
                .unwrap();
        }
        session.start_capture().unwrap();

        // Auto-stop at the frame limit, then an explicit stop racing behind it.
        session
            .start_recording(&RecordingConfig::new("bounded.rrf").with_max_frames(2))
            .unwrap();
        control.deliver_depth_data(synthetic_depth_data(0, 4, 4));
        control.deliver_depth_data(synthetic_depth_data(1, 4, 4));
        control.flush();
        session.stop_recording().unwrap();
        assert_eq!(*stops.lock().unwrap(), vec![2]);
        assert!(!session.is_recording());

        // Explicit stop of an unbounded recording.
        session
            .start_recording(&RecordingConfig::new("open.rrf"))
            .unwrap();
        control.deliver_depth_data(synthetic_depth_data(2, 4, 4));
        control.flush();
        session.stop_recording().unwrap();
        session.stop_recording().unwrap();
        assert_eq!(*stops.lock().unwrap(), vec![2, 1]);
    }

    #[test]
    fn test_recording_rejects_conflicting_skips() {
        let library = Arc::new(MockLibrary::new());
        let session = open_pre_granted(library);
        session.initialize().unwrap();

        let config = RecordingConfig::new("skips.rrf")
            .with_frame_skip(1)
            .with_ms_skip(10);
        assert!(matches!(
            session.start_recording(&config),
            Err(CameraError::InvalidValue(_))
        ));
        assert!(!session.is_recording());
    }

    #[test]
    fn test_disconnect_event_fails_later_operations() {
        let library = Arc::new(MockLibrary::new());
        let session = open_pre_granted(library.clone());
        let control = library.last_opened().unwrap();
        let events: Arc<Mutex<Vec<CameraEvent>>> = Arc::new(Mutex::new(Vec::new()));

        session.initialize().unwrap();
        {
            let events = events.clone();
            session
                .register_event_listener(move |event| {
                    events.lock().unwrap().push(event.clone());
                })
                .unwrap();
        }
        session.register_depth_data_listener(|_| {}).unwrap();
        session.start_capture().unwrap();

        control.disconnect();
        control.flush();

        assert_eq!(events.lock().unwrap()[0].kind, EventKind::DeviceDisconnected);
        assert_eq!(session.set_frame_rate(5), Err(CameraError::NotConnected));
        assert_eq!(session.camera_name(), Err(CameraError::NotConnected));
        assert_eq!(session.is_connected(), Ok(false));

        session.close().unwrap();
        assert_eq!(control.finalize_count(), 1);
    }

    #[test]
    fn test_configuration_round_trip() {
        let library = Arc::new(MockLibrary::new());
        let session = open_pre_granted(library);
        session.initialize().unwrap();

        let use_cases = session.use_cases().unwrap();
        session.set_use_case(&use_cases[1]).unwrap();
        assert_eq!(session.current_use_case().unwrap(), use_cases[1]);
        assert!(matches!(
            session.set_use_case("NOT_A_MODE"),
            Err(CameraError::UseCaseNotSupported(_))
        ));

        session.set_frame_rate(10).unwrap();
        assert_eq!(session.frame_rate().unwrap(), 10);
        assert!(matches!(
            session.set_frame_rate(1000),
            Err(CameraError::FrameRateNotSupported(_))
        ));

        session
            .set_exposure_mode(tofcam::ExposureMode::Automatic, StreamId::DEFAULT)
            .unwrap();
        assert!(matches!(
            session.set_exposure_time(500, StreamId::DEFAULT),
            Err(CameraError::ExposureModeInvalid(_))
        ));
        assert_eq!(session.max_sensor_width().unwrap(), 224);
        assert!(session.is_calibrated().unwrap());
    }

    #[test]
    fn test_playback_session() {
        let library = Arc::new(MockLibrary::new().with_recording("walk.rrf", 120));
        let manager = SessionManager::new(library.clone(), "");
        let session = manager.create_session_from_file("walk.rrf").unwrap();

        assert!(matches!(session.source(), SessionSource::Playback(_)));
        session.initialize().unwrap();
        assert_eq!(session.frame_count().unwrap(), 120);
        session.seek(10).unwrap();
        assert!(matches!(session.seek(500), Err(CameraError::OutOfBounds(_))));

        assert!(matches!(
            session.set_exposure_time(500, StreamId::DEFAULT),
            Err(CameraError::LogicError(_))
        ));
        assert!(matches!(
            session.set_frame_rate(5),
            Err(CameraError::LogicError(_))
        ));
        assert!(matches!(
            session.set_external_trigger(true),
            Err(CameraError::LogicError(_))
        ));
        assert!(matches!(
            session.start_recording(&RecordingConfig::new("copy.rrf")),
            Err(CameraError::LogicError(_))
        ));
    }
}
