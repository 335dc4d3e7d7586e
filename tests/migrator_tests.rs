use anyhow::Result;
use async_trait::async_trait;
use playlistty::api::mock::{MockCall, MockClient};
use playlistty::api::spotify::SpotifyClient;
use playlistty::api::PlatformClient;
use playlistty::auth::Authorizer;
use playlistty::catalog::TrackCatalog;
use playlistty::config::Credentials;
use playlistty::migrator::{MigrationState, Migrator};
use playlistty::models::{MigrationJob, Service, Track, DEFAULT_DESCRIPTION};
use std::sync::{Arc, Mutex};
use tempfile::tempdir;

fn three_tracks() -> Vec<Track> {
    vec![
        Track::new("First", vec!["A".into()], "s1"),
        Track::new("Second", vec!["A".into()], "s2"),
        Track::new("Third", vec!["B".into()], "s3"),
    ]
}

fn job_into(target_playlist_id: &str) -> MigrationJob {
    MigrationJob {
        source_service: Service::Spotify,
        source_playlist_id: "src".into(),
        target_service: Service::Youtube,
        target_playlist_id: target_playlist_id.into(),
        create_new: false,
        target_name: String::new(),
        target_description: String::new(),
    }
}

fn yes(_: Service, _: &str) -> bool {
    true
}

fn adds(log: &[MockCall]) -> Vec<Vec<String>> {
    log.iter()
        .filter_map(|c| match c {
            MockCall::Add { ids, .. } => Some(ids.clone()),
            _ => None,
        })
        .collect()
}

fn removes(log: &[MockCall]) -> Vec<Vec<String>> {
    log.iter()
        .filter_map(|c| match c {
            MockCall::Remove { handles, .. } => Some(handles.clone()),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn partial_match_appends_only_resolved_tracks() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify).with_tracks("src", three_tracks());
    let dest = MockClient::new(Service::Youtube)
        .with_search_result("First", "A", "y1")
        .with_search_result("Second", "A", "y2");
    let log = dest.call_log();

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let report = m.run(&job_into("dest"), &yes).await.unwrap();

    assert_eq!(*m.state(), MigrationState::Done);
    assert_eq!(report.total, 3);
    assert_eq!(report.resolved, 2);
    assert_eq!(report.unresolved.len(), 1);
    assert_eq!(report.unresolved[0].name, "Third");
    assert_eq!(report.append_requests, 1);

    let log = log.lock().unwrap().clone();
    assert_eq!(adds(&log), vec![vec!["y1".to_string(), "y2".to_string()]]);

    // snapshot on disk carries the match results
    let saved = TrackCatalog::load(dir.path(), Service::Spotify, "src").unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved.resolved_ids(), vec!["y1".to_string(), "y2".to_string()]);
    assert_eq!(report.catalog_path, TrackCatalog::path_for(dir.path(), Service::Spotify, "src"));
}

#[tokio::test]
async fn existing_items_are_removed_in_windows_of_100() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify).with_tracks("src", three_tracks());
    let dest = MockClient::new(Service::Youtube)
        .with_limits(100, 25)
        .with_existing_items("dest", 150);
    let log = dest.call_log();

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let report = m.run(&job_into("dest"), &yes).await.unwrap();

    assert_eq!(report.remove_requests, 2);
    let log = log.lock().unwrap().clone();
    let sizes: Vec<usize> = removes(&log).iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![100, 50]);
}

#[tokio::test]
async fn nothing_resolved_still_reaches_done() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify).with_tracks("src", three_tracks());
    let dest = MockClient::new(Service::Youtube);
    let log = dest.call_log();

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let report = m.run(&job_into("dest"), &yes).await.unwrap();

    assert_eq!(report.resolved, 0);
    assert_eq!(report.append_requests, 0);
    assert!(m.transitions().contains(&MigrationState::Applied));
    assert_eq!(*m.state(), MigrationState::Done);
    assert!(adds(&log.lock().unwrap()).is_empty());
}

#[tokio::test]
async fn refused_confirmation_aborts_before_any_removal() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify).with_tracks("src", three_tracks());
    let dest = MockClient::new(Service::Youtube).with_existing_items("dest", 10);
    let log = dest.call_log();

    let asked = Mutex::new(Vec::new());
    let refuse = |service: Service, id: &str| {
        asked.lock().unwrap().push((service, id.to_string()));
        false
    };

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let res = m.run(&job_into("dest"), &refuse).await;

    assert!(res.is_err());
    assert!(matches!(m.state(), MigrationState::Aborted { after, .. } if after == "target-prepared"));
    assert_eq!(*asked.lock().unwrap(), vec![(Service::Youtube, "dest".to_string())]);
    let log = log.lock().unwrap().clone();
    assert!(removes(&log).is_empty());
    assert!(adds(&log).is_empty());
}

#[tokio::test]
async fn new_playlist_is_created_private_with_default_description() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify).with_tracks("src", three_tracks());
    let dest = MockClient::new(Service::Youtube).with_search_result("Third", "B", "y3");
    let log = dest.call_log();

    let mut job = job_into("");
    job.create_new = true;
    job.target_name = "Road Trip".into();

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let report = m.run(&job, &yes).await.unwrap();

    assert_eq!(report.target_playlist_id, "mock-created");
    let log = log.lock().unwrap().clone();
    assert!(log.contains(&MockCall::Create {
        title: "Road Trip".into(),
        description: DEFAULT_DESCRIPTION.into(),
        public: false,
    }));
    assert!(log.contains(&MockCall::Add {
        playlist_id: "mock-created".into(),
        ids: vec!["y3".into()],
        position: 0,
    }));
}

#[tokio::test]
async fn missing_source_playlist_aborts_after_authentication() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify);
    let dest = MockClient::new(Service::Youtube);
    let log = dest.call_log();

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    assert!(m.run(&job_into("dest"), &yes).await.is_err());

    assert!(matches!(m.state(), MigrationState::Aborted { after, .. } if after == "authenticated"));
    let log = log.lock().unwrap().clone();
    assert!(!log.iter().any(|c| matches!(c, MockCall::Search { .. } | MockCall::Remove { .. })));
}

#[tokio::test]
async fn failed_append_window_does_not_stop_the_rest() {
    let dir = tempdir().unwrap();
    let tracks: Vec<Track> = (0..60)
        .map(|i| Track::new(format!("t{}", i), vec!["X".into()], format!("s{}", i)))
        .collect();
    let mut dest = MockClient::new(Service::Youtube).with_limits(1, 25).failing_add(1);
    for i in 0..60 {
        dest = dest.with_search_result(&format!("t{}", i), "X", &format!("y{}", i));
    }
    let log = dest.call_log();
    let source = MockClient::new(Service::Spotify).with_tracks("src", tracks);

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let report = m.run(&job_into("dest"), &yes).await.unwrap();

    assert_eq!(report.append_requests, 3);
    assert_eq!(*m.state(), MigrationState::Done);
    let log = log.lock().unwrap().clone();
    let sizes: Vec<usize> = adds(&log).iter().map(Vec::len).collect();
    assert_eq!(sizes, vec![25, 25, 10]);
    // every window knows where its first track belongs
    let positions: Vec<usize> = log
        .iter()
        .filter_map(|c| match c {
            MockCall::Add { position, .. } => Some(*position),
            _ => None,
        })
        .collect();
    assert_eq!(positions, vec![0, 25, 50]);
}

#[tokio::test]
async fn search_uses_only_the_first_artist() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify).with_tracks(
        "src",
        vec![Track::new("Duet", vec!["A".into(), "C".into()], "s1")],
    );
    let dest = MockClient::new(Service::Youtube).with_search_result("Duet", "A", "y1");
    let log = dest.call_log();

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let report = m.run(&job_into("dest"), &yes).await.unwrap();

    assert_eq!(report.resolved, 1);
    let searches: Vec<MockCall> = log
        .lock()
        .unwrap()
        .iter()
        .filter(|c| matches!(c, MockCall::Search { .. }))
        .cloned()
        .collect();
    assert_eq!(
        searches,
        vec![MockCall::Search { name: "Duet".into(), artist: "A".into() }]
    );
}

#[tokio::test]
async fn same_platform_reuses_source_ids_without_searching() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify).with_tracks("src", three_tracks());
    let dest = MockClient::new(Service::Spotify).with_limits(100, 100);
    let log = dest.call_log();

    let mut job = job_into("dest");
    job.target_service = Service::Spotify;

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    let report = m.run(&job, &yes).await.unwrap();

    assert_eq!(report.resolved, 3);
    let log = log.lock().unwrap().clone();
    assert!(!log.iter().any(|c| matches!(c, MockCall::Search { .. })));
    assert_eq!(
        adds(&log),
        vec![vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]]
    );
}

struct FailingAuthorizer {
    calls: Mutex<Vec<Service>>,
}

#[async_trait]
impl Authorizer for FailingAuthorizer {
    async fn authorize(&self, service: Service) -> Result<String> {
        self.calls.lock().unwrap().push(service);
        anyhow::bail!("user closed the browser")
    }
}

struct FixedAuthorizer {
    token: String,
    calls: Mutex<Vec<Service>>,
}

#[async_trait]
impl Authorizer for FixedAuthorizer {
    async fn authorize(&self, service: Service) -> Result<String> {
        self.calls.lock().unwrap().push(service);
        Ok(self.token.clone())
    }
}

#[tokio::test]
async fn rejected_token_is_replaced_by_reauthorization() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify)
        .accepting_token("fresh")
        .with_tracks("src", three_tracks());
    let source_log = source.call_log();
    let dest = MockClient::new(Service::Youtube);

    let authorizer = Arc::new(FixedAuthorizer {
        token: "fresh".into(),
        calls: Mutex::new(Vec::new()),
    });

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path())
        .with_authorizer(authorizer.clone());
    m.authenticate().await;

    assert_eq!(*m.state(), MigrationState::Authenticated);
    assert_eq!(*authorizer.calls.lock().unwrap(), vec![Service::Spotify]);
    let log = source_log.lock().unwrap().clone();
    let tokens: Vec<String> = log
        .iter()
        .filter_map(|c| match c {
            MockCall::Validate { token } => Some(token.clone()),
            _ => None,
        })
        .collect();
    assert_eq!(tokens, vec!["mock-token".to_string(), "fresh".to_string()]);

    // the run continues from Authenticated with the new token in place
    let report = m.run(&job_into("dest"), &yes).await.unwrap();
    assert_eq!(report.total, 3);
}

#[tokio::test]
async fn job_for_other_platforms_is_refused() {
    let dir = tempdir().unwrap();
    let source = MockClient::new(Service::Spotify);
    let dest = MockClient::new(Service::Youtube);

    let mut job = job_into("dest");
    job.source_service = Service::Youtube;

    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path());
    assert!(m.run(&job, &yes).await.is_err());
    assert!(matches!(m.state(), MigrationState::Aborted { after, .. } if after == "init"));
}

#[tokio::test]
async fn unreachable_platform_does_not_start_reauthorization() {
    // nothing listens on port 1, so the token check fails at the transport level
    let creds = Credentials {
        token: "tok".into(),
        ..Credentials::default()
    };
    let source = SpotifyClient::new(creds).with_api_base("http://127.0.0.1:1");
    let dest = MockClient::new(Service::Youtube);

    let authorizer = Arc::new(FailingAuthorizer { calls: Mutex::new(Vec::new()) });
    let dir = tempdir().unwrap();
    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path())
        .with_authorizer(authorizer.clone());
    m.authenticate().await;

    assert_eq!(*m.state(), MigrationState::Authenticated);
    assert!(authorizer.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn same_platform_reauthorizes_at_most_once() {
    let source = MockClient::new(Service::Spotify).accepting_token("never");
    let dest = MockClient::new(Service::Spotify).accepting_token("never");
    let dest_log = dest.call_log();

    let authorizer = Arc::new(FailingAuthorizer { calls: Mutex::new(Vec::new()) });
    let dir = tempdir().unwrap();
    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path())
        .with_authorizer(authorizer.clone());
    m.authenticate().await;

    assert_eq!(*m.state(), MigrationState::Authenticated);
    assert_eq!(*authorizer.calls.lock().unwrap(), vec![Service::Spotify]);
    assert!(!dest_log
        .lock()
        .unwrap()
        .iter()
        .any(|c| matches!(c, MockCall::Validate { .. })));
}

#[tokio::test]
async fn same_platform_destination_gets_the_new_token() {
    let source = MockClient::new(Service::Spotify).accepting_token("fresh");
    let dest = MockClient::new(Service::Spotify)
        .accepting_token("fresh")
        .with_limits(100, 100);
    let dest_log = dest.call_log();

    let authorizer = Arc::new(FixedAuthorizer {
        token: "fresh".into(),
        calls: Mutex::new(Vec::new()),
    });
    let dir = tempdir().unwrap();
    let mut m = Migrator::new(Box::new(source), Box::new(dest), dir.path())
        .with_authorizer(authorizer.clone());
    m.authenticate().await;
    assert_eq!(*authorizer.calls.lock().unwrap(), vec![Service::Spotify]);

    // the destination now validates with the shared token
    assert!(m.destination().validate_token().await.is_ok());
    assert_eq!(
        dest_log.lock().unwrap().last(),
        Some(&MockCall::Validate { token: "fresh".into() })
    );
}
