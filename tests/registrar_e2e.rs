use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, Sender};

use alertroute::{
    AlertResult, AlertService, AlertServiceConfig, DefaultHandlerFactory, Event, Events, Handler, HandlerError,
    HandlerFactory, HandlerKind, HandlerRef, HandlerSpec, HandlerSpecRegistrar, HandlerSpecStore,
    InMemoryHandlerSpecStore, Level, PostConfig, PostRequest, PostTransport,
};

/// Builds handlers that report `(spec id, event)` pairs.
struct TaggingFactory(Sender<(String, Event)>);

struct Tagging {
    id: String,
    tx: Sender<(String, Event)>,
}

impl Handler for Tagging {
    fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        self.tx
            .send((self.id.clone(), event.clone()))
            .map_err(|e| HandlerError::delivery(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.id
    }
}

impl HandlerFactory for TaggingFactory {
    fn build(&self, spec: &HandlerSpec) -> AlertResult<HandlerRef> {
        Ok(Arc::new(Tagging {
            id: spec.id.clone(),
            tx: self.0.clone(),
        }))
    }
}

#[derive(Default)]
struct RecordingTransport(Mutex<Vec<PostRequest>>);

impl PostTransport for RecordingTransport {
    fn send(&self, request: PostRequest) -> Result<(), HandlerError> {
        self.0
            .lock()
            .map_err(|_| HandlerError::delivery("poisoned"))?
            .push(request);
        Ok(())
    }
}

fn log_spec(id: &str, topics: &[&str]) -> HandlerSpec {
    HandlerSpec::new(id, topics.iter().copied(), HandlerKind::Log { prefix: String::new() })
}

fn tagging_service(store: Arc<dyn HandlerSpecStore>) -> (AlertService, Receiver<(String, Event)>) {
    let (tx, rx) = unbounded();
    let svc = AlertService::new(AlertServiceConfig::default(), store, Arc::new(TaggingFactory(tx))).unwrap();
    (svc, rx)
}

#[test]
fn spec_handler_receives_topic_events() {
    let (svc, rx) = tagging_service(Arc::new(InMemoryHandlerSpecStore::new()));
    svc.register_handler_spec(log_spec("ops", &["disk", "cpu"])).unwrap();

    svc.collect(Event::new("disk", "e1", Level::Warning)).unwrap();
    svc.collect(Event::new("mem", "e1", Level::Warning)).unwrap();
    svc.collect(Event::new("cpu", "e1", Level::Critical)).unwrap();

    let (id, ev) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!((id.as_str(), ev.topic.as_str()), ("ops", "disk"));
    let (_, ev) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(ev.topic, "cpu");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    svc.deregister_handler_spec("ops").unwrap();
    svc.collect(Event::new("disk", "e1", Level::Critical)).unwrap();
    assert!(rx.recv_timeout(Duration::from_millis(200)).is_err());
    assert!(svc.handler_spec("ops").unwrap_err().is_not_found());
}

#[test]
fn update_moves_handler_between_topics() {
    let (svc, rx) = tagging_service(Arc::new(InMemoryHandlerSpecStore::new()));
    let old = log_spec("ops", &["a", "b"]);
    svc.register_handler_spec(old.clone()).unwrap();
    svc.update_handler_spec(&old, log_spec("ops", &["b", "c"])).unwrap();

    for topic in ["a", "b", "c"] {
        svc.collect(Event::new(topic, "e1", Level::Info)).unwrap();
    }
    let mut seen: Vec<String> = (0..2)
        .map(|_| rx.recv_timeout(Duration::from_secs(1)).unwrap().1.topic)
        .collect();
    seen.sort();
    assert_eq!(seen, vec!["b".to_string(), "c".to_string()]);
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());

    assert_eq!(svc.topic_handler_count("a").unwrap(), 0);
    assert_eq!(svc.handler_spec("ops").unwrap().topics, vec!["b".to_string(), "c".to_string()]);
}

#[test]
fn update_keeps_shared_topic_covered() {
    let svc = Arc::new(AlertService::with_defaults().unwrap());
    let ab = log_spec("ops", &["a", "b"]);
    let bc = log_spec("ops", &["b", "c"]);
    svc.register_handler_spec(ab.clone()).unwrap();

    let stop = Arc::new(AtomicBool::new(false));
    let watcher = {
        let svc = Arc::clone(&svc);
        let stop = Arc::clone(&stop);
        thread::spawn(move || {
            let mut min = usize::MAX;
            loop {
                min = min.min(svc.topic_handler_count("b").unwrap());
                if stop.load(Ordering::Relaxed) {
                    break;
                }
            }
            min
        })
    };

    for _ in 0..200 {
        svc.update_handler_spec(&ab, bc.clone()).unwrap();
        svc.update_handler_spec(&bc, ab.clone()).unwrap();
    }
    stop.store(true, Ordering::Relaxed);

    assert_eq!(watcher.join().unwrap(), 1);
    assert_eq!(svc.topic_handler_count("b").unwrap(), 1);
}

#[test]
fn rename_replaces_handler() {
    let (svc, rx) = tagging_service(Arc::new(InMemoryHandlerSpecStore::new()));
    let old = log_spec("ops", &["disk"]);
    svc.register_handler_spec(old.clone()).unwrap();
    svc.register_handler_spec(log_spec("dev", &["cpu"])).unwrap();

    let err = svc.update_handler_spec(&old, log_spec("dev", &["disk"])).unwrap_err();
    assert!(err.is_already_exists());

    svc.update_handler_spec(&old, log_spec("sre", &["disk"])).unwrap();
    svc.collect(Event::new("disk", "e1", Level::Info)).unwrap();
    assert_eq!(rx.recv_timeout(Duration::from_secs(1)).unwrap().0, "sre");
    assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
    assert_eq!(svc.topic_handler_count("disk").unwrap(), 1);

    let ids: Vec<_> = svc.handler_specs("*").unwrap().into_iter().map(|s| s.id).collect();
    assert_eq!(ids, vec!["dev".to_string(), "sre".to_string()]);
    assert_eq!(svc.handler_specs("s?e").unwrap().len(), 1);
}

#[test]
fn invalid_specs_are_rejected_without_side_effects() {
    let svc = AlertService::with_defaults().unwrap();
    assert!(svc.register_handler_spec(log_spec("ops", &[])).unwrap_err().is_validation());
    assert!(svc.register_handler_spec(log_spec("", &["disk"])).unwrap_err().is_validation());

    let bad_url = HandlerSpec::new("p", ["disk"], HandlerKind::Post(PostConfig::new("ops", "not a url")));
    assert!(svc.register_handler_spec(bad_url).unwrap_err().is_validation());

    svc.register_handler_spec(log_spec("ops", &["disk"])).unwrap();
    assert!(svc
        .register_handler_spec(log_spec("ops", &["cpu"]))
        .unwrap_err()
        .is_already_exists());
    assert!(svc.handler_specs("*").unwrap().len() == 1);
    assert!(svc.topic_handler_count("cpu").unwrap() == 0);
}

#[test]
fn specs_survive_restart() {
    let store: Arc<dyn HandlerSpecStore> = Arc::new(InMemoryHandlerSpecStore::new());
    {
        let (svc, _rx) = tagging_service(Arc::clone(&store));
        svc.register_handler_spec(log_spec("ops", &["disk"])).unwrap();
        svc.register_handler_spec(log_spec("dev", &["cpu", "disk"])).unwrap();
    }

    let (svc, rx) = tagging_service(store);
    assert_eq!(svc.topic_handler_count("disk").unwrap(), 2);
    svc.collect(Event::new("cpu", "e1", Level::Critical)).unwrap();
    let (id, ev) = rx.recv_timeout(Duration::from_secs(1)).unwrap();
    assert_eq!(id, "dev");
    assert_eq!(ev.level, Level::Critical);
}

#[test]
fn post_spec_sends_json_request() {
    let transport = Arc::new(RecordingTransport::default());
    let factory = DefaultHandlerFactory::with_transport(Arc::clone(&transport) as Arc<dyn PostTransport>);
    let svc = AlertService::new(
        AlertServiceConfig::default(),
        Arc::new(InMemoryHandlerSpecStore::new()),
        Arc::new(factory),
    )
    .unwrap();

    let cfg = PostConfig::new("ops", "http://localhost:9000/alerts").with_header("X-Team", "ops");
    svc.register_handler_spec(HandlerSpec::new("pager", ["disk"], HandlerKind::Post(cfg)))
        .unwrap();
    svc.collect(Event::new("disk", "sda", Level::Critical).with_message("full"))
        .unwrap();

    let mut sent = Vec::new();
    for _ in 0..200 {
        sent = transport.0.lock().unwrap().clone();
        if !sent.is_empty() {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].url.as_str(), "http://localhost:9000/alerts");
    assert_eq!(sent[0].headers["X-Team"], "ops");
    let body: Event = serde_json::from_slice(&sent[0].body).unwrap();
    assert_eq!(body.message, "full");
    assert_eq!(body.level, Level::Critical);
}
