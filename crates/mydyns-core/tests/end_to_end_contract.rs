//! Contract Test: End To End
//!
//! Issues a token, applies an update with it, and follows the update
//! through the worker to the rendered nsupdate script.

mod common;

use common::*;
use mydyns_core::config::NsUpdateConfig;
use mydyns_core::credentials::CredentialDb;
use mydyns_core::error::Error;
use mydyns_core::nsupdate::NsUpdateDispatcher;
use mydyns_core::service::{BasicAuth, DynDns, UpdateOutcome, UpdateRequest};
use mydyns_core::token::{TokenCodec, TokenData, UPDATE_TOKEN_PURPOSE};
use mydyns_core::worker::WorkerEvent;
use std::path::PathBuf;
use std::sync::Arc;

const SECRET: [u8; 32] = [9u8; 32];

fn nsupdate_config() -> NsUpdateConfig {
    NsUpdateConfig {
        exe: PathBuf::from("/usr/bin/nsupdate"),
        server: "ns1.example.org".to_string(),
        keyfile: PathBuf::from("/etc/mydyns/update.key"),
        zone: "dyn.example.org".to_string(),
        ttl: 300,
        timeout_secs: 30,
    }
}

#[tokio::test(start_paused = true)]
async fn issued_token_updates_one_a_record() {
    let fixture = CredentialFixture::new("alice:seed-1\n");
    let db = Arc::new(CredentialDb::open(fixture.paths.clone()).await.unwrap());
    let dispatcher = RecordingDispatcher::new();
    let mut worker = spawn_worker(dispatcher.clone(), 100);
    let dyndns = DynDns::new(
        TokenCodec::new(SECRET).unwrap(),
        db,
        worker.queue.clone(),
        true,
    );

    let alice = BasicAuth {
        user: "alice",
        password: "wonderland",
    };
    let token = dyndns.issue_token(Some(alice), Some("example")).await.unwrap();

    let decoded: TokenData = TokenCodec::new(SECRET)
        .unwrap()
        .decode(UPDATE_TOKEN_PURPOSE, &token)
        .unwrap();
    assert_eq!(decoded.host, "example");
    assert_eq!(decoded.user, "alice");
    assert_eq!(decoded.security.len(), 32);

    let outcome = dyndns
        .apply_update(UpdateRequest {
            token: Some(&token),
            myip: Some("8.8.8.8"),
            address: None,
            check: false,
            remote: ip("203.0.113.9"),
            forwarded: None,
        })
        .await
        .unwrap();
    assert_eq!(
        outcome,
        UpdateOutcome::Accepted {
            hostname: "example".to_string(),
            ip: ip("8.8.8.8"),
        }
    );

    assert_eq!(worker.next_flush().await, WorkerEvent::Flushed { records: 1 });
    let batches = dispatcher.batches();
    assert_eq!(batches.len(), 1);

    let script = NsUpdateDispatcher::new(nsupdate_config())
        .unwrap()
        .script(&batches[0]);
    let adds: Vec<_> = script
        .lines()
        .filter(|line| line.starts_with("update add"))
        .collect();
    assert_eq!(adds, ["update add example.dyn.example.org. 300 A 8.8.8.8"]);

    worker.stop().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn auto_detected_address_through_local_proxy() {
    let fixture = CredentialFixture::new("");
    let db = Arc::new(CredentialDb::open(fixture.paths.clone()).await.unwrap());
    let dispatcher = RecordingDispatcher::new();
    let mut worker = spawn_worker(dispatcher.clone(), 100);
    let dyndns = DynDns::new(
        TokenCodec::new(SECRET).unwrap(),
        db,
        worker.queue.clone(),
        true,
    );

    let bob = BasicAuth {
        user: "bob",
        password: "builder",
    };
    let token = dyndns.issue_token(Some(bob), Some("garage")).await.unwrap();

    let mut request = UpdateRequest {
        token: Some(&token),
        myip: Some("auto"),
        address: None,
        check: false,
        remote: ip("127.0.0.1"),
        forwarded: None,
    };

    // Loopback peer without the proxy header cannot be resolved
    assert!(matches!(
        dyndns.apply_update(request).await,
        Err(Error::InvalidInput(_))
    ));

    request.forwarded = Some("2001:db8::42");
    dyndns.apply_update(request).await.unwrap();

    assert_eq!(worker.next_flush().await, WorkerEvent::Flushed { records: 1 });
    assert_eq!(dispatcher.batches()[0]["garage"], ip("2001:db8::42"));

    worker.stop().await.unwrap();
}
