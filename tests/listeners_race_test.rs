//! Concurrency behaviour of the listener registry.

#[cfg(test)]
mod listener_race_tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::thread;
    use std::time::Duration;
    use tofcam::testing::synthetic_depth_data;
    use tofcam::{CameraError, CameraEvent, ListenerKind, ListenerRegistry};

    #[test]
    fn test_order_preserved_while_listeners_swap() {
        let registry = Arc::new(ListenerRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));

        let make_listener = |seen: Arc<Mutex<Vec<i64>>>| {
            Arc::new(move |frame: &tofcam::DepthData| {
                seen.lock().unwrap().push(frame.timestamp);
            })
        };
        registry
            .set_depth_data_listener(make_listener(seen.clone()))
            .unwrap();

        let swapper = {
            let registry = registry.clone();
            let seen = seen.clone();
            thread::spawn(move || {
                for _ in 0..500 {
                    registry
                        .set_depth_data_listener(make_listener(seen.clone()))
                        .unwrap();
                    thread::yield_now();
                }
            })
        };

        for frame_number in 0..1000 {
            registry.dispatch_depth_data(&synthetic_depth_data(frame_number, 1, 1));
        }
        swapper.join().unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1000);
        assert!(seen.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn test_same_kind_deliveries_never_overlap() {
        let registry = Arc::new(ListenerRegistry::new());
        let busy = Arc::new(AtomicBool::new(false));
        let overlapped = Arc::new(AtomicBool::new(false));
        let calls = Arc::new(AtomicUsize::new(0));

        {
            let busy = busy.clone();
            let overlapped = overlapped.clone();
            let calls = calls.clone();
            registry.set_event_listener(Arc::new(move |_| {
                if busy.swap(true, Ordering::SeqCst) {
                    overlapped.store(true, Ordering::SeqCst);
                }
                thread::yield_now();
                calls.fetch_add(1, Ordering::SeqCst);
                busy.store(false, Ordering::SeqCst);
            }))
            .unwrap();
        }

        let workers: Vec<_> = (0..4)
            .map(|_| {
                let registry = registry.clone();
                thread::spawn(move || {
                    for _ in 0..100 {
                        registry.dispatch_event(&CameraEvent::disconnected("stress"));
                    }
                })
            })
            .collect();
        for worker in workers {
            worker.join().unwrap();
        }

        assert!(!overlapped.load(Ordering::SeqCst));
        assert_eq!(calls.load(Ordering::SeqCst), 400);
    }

    #[test]
    fn test_unregister_stops_future_dispatches() {
        let registry = ListenerRegistry::new();
        let calls = Arc::new(AtomicUsize::new(0));
        {
            let calls = calls.clone();
            registry.set_depth_data_listener(Arc::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }))
            .unwrap();
        }

        assert!(registry.dispatch_depth_data(&synthetic_depth_data(0, 1, 1)));
        assert!(registry.clear(ListenerKind::DepthData));
        assert!(!registry.clear(ListenerKind::DepthData));
        assert!(!registry.dispatch_depth_data(&synthetic_depth_data(1, 1, 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_shutdown_waits_for_in_flight_dispatch() {
        let registry = Arc::new(ListenerRegistry::new());
        let (entered_tx, entered_rx) = crossbeam_channel::bounded(1);
        let (release_tx, release_rx) = crossbeam_channel::bounded::<()>(1);

        registry.set_depth_data_listener(Arc::new(move |_| {
            entered_tx.send(()).ok();
            release_rx.recv().ok();
        }))
        .unwrap();

        let dispatcher = {
            let registry = registry.clone();
            thread::spawn(move || registry.dispatch_depth_data(&synthetic_depth_data(0, 1, 1)))
        };
        entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        let (done_tx, done_rx) = crossbeam_channel::bounded(1);
        let closer = {
            let registry = registry.clone();
            thread::spawn(move || {
                registry.shutdown();
                done_tx.send(()).ok();
            })
        };

        assert!(done_rx.recv_timeout(Duration::from_millis(200)).is_err());
        release_tx.send(()).unwrap();
        done_rx.recv_timeout(Duration::from_secs(5)).unwrap();

        assert!(dispatcher.join().unwrap());
        closer.join().unwrap();
        assert!(!registry.dispatch_depth_data(&synthetic_depth_data(1, 1, 1)));
    }

    #[test]
    fn test_registration_racing_shutdown_leaves_no_listener() {
        for _ in 0..50 {
            let registry = Arc::new(ListenerRegistry::new());
            let registrar = {
                let registry = registry.clone();
                thread::spawn(move || loop {
                    match registry.set_ir_image_listener(Arc::new(|_| {})) {
                        Ok(()) => thread::yield_now(),
                        Err(e) => return e,
                    }
                })
            };

            thread::yield_now();
            registry.shutdown();

            assert_eq!(registrar.join().unwrap(), CameraError::SessionClosed);
            assert!(!registry.is_registered(ListenerKind::IrImage));
        }
    }
}
