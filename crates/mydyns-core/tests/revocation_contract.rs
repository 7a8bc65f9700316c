//! Contract Test: Revocation
//!
//! Verifies that tokens are only as good as the credentials behind them.
//!
//! Constraints verified:
//! - Rotating a user's seed invalidates all of that user's tokens
//! - Other users' tokens are unaffected
//! - Removing a user from a host invalidates tokens for that host
//! - Unseeded users pass only when the policy allows it
//! - A reload that fails keeps the previous credentials in service

mod common;

use common::*;
use mydyns_core::config::WorkerConfig;
use mydyns_core::credentials::CredentialDb;
use mydyns_core::error::Error;
use mydyns_core::service::{BasicAuth, DynDns, UpdateOutcome, UpdateRequest};
use mydyns_core::token::TokenCodec;
use mydyns_core::worker::UpdateWorker;
use std::sync::Arc;

const ALICE: BasicAuth<'static> = BasicAuth {
    user: "alice",
    password: "wonderland",
};

const BOB: BasicAuth<'static> = BasicAuth {
    user: "bob",
    password: "builder",
};

async fn service(fixture: &CredentialFixture, allow_unseeded: bool) -> (DynDns, UpdateWorker) {
    let db = CredentialDb::open(fixture.paths.clone()).await.unwrap();
    let (worker, queue, _events) =
        UpdateWorker::new(Box::new(RecordingDispatcher::new()), &WorkerConfig::default()).unwrap();
    let codec = TokenCodec::new(vec![42u8; 64]).unwrap();
    (DynDns::new(codec, Arc::new(db), queue, allow_unseeded), worker)
}

fn check(token: &str) -> UpdateRequest<'_> {
    UpdateRequest {
        token: Some(token),
        myip: Some("8.8.8.8"),
        address: None,
        check: true,
        remote: ip("203.0.113.9"),
        forwarded: None,
    }
}

#[tokio::test]
async fn rotating_seed_revokes_only_that_user() {
    let fixture = CredentialFixture::new("alice:seed-1\nbob:seed-b\n");
    let (dyndns, _worker) = service(&fixture, true).await;

    let alice_token = dyndns.issue_token(Some(ALICE), Some("example")).await.unwrap();
    let bob_token = dyndns.issue_token(Some(BOB), Some("garage")).await.unwrap();
    assert!(dyndns.apply_update(check(&alice_token)).await.is_ok());

    fixture.set_security("alice:seed-2\nbob:seed-b\n");
    dyndns.credentials().reload().await.unwrap();

    assert!(matches!(
        dyndns.apply_update(check(&alice_token)).await,
        Err(Error::Authorization(_))
    ));
    assert_eq!(
        dyndns.apply_update(check(&bob_token)).await.unwrap(),
        UpdateOutcome::Checked(ip("8.8.8.8"))
    );

    // A fresh token picks up the new seed
    let renewed = dyndns.issue_token(Some(ALICE), Some("example")).await.unwrap();
    assert!(dyndns.apply_update(check(&renewed)).await.is_ok());
}

#[tokio::test]
async fn adding_a_seed_revokes_unseeded_tokens() {
    let fixture = CredentialFixture::new("");
    let (dyndns, _worker) = service(&fixture, true).await;

    let token = dyndns.issue_token(Some(ALICE), Some("example")).await.unwrap();
    assert!(dyndns.apply_update(check(&token)).await.is_ok());

    fixture.set_security("alice:first-seed\n");
    dyndns.credentials().reload().await.unwrap();

    assert!(matches!(
        dyndns.apply_update(check(&token)).await,
        Err(Error::Authorization(_))
    ));
}

#[tokio::test]
async fn unseeded_users_follow_policy() {
    let fixture = CredentialFixture::new("bob:seed-b\n");

    let (permissive, _w1) = service(&fixture, true).await;
    let token = permissive.issue_token(Some(ALICE), Some("example")).await.unwrap();
    assert!(permissive.apply_update(check(&token)).await.is_ok());

    let (strict, _w2) = service(&fixture, false).await;
    assert!(matches!(
        strict.apply_update(check(&token)).await,
        Err(Error::Authorization(_))
    ));

    // Seeded users are checked either way
    let bob_token = strict.issue_token(Some(BOB), Some("garage")).await.unwrap();
    assert!(strict.apply_update(check(&bob_token)).await.is_ok());
}

#[tokio::test]
async fn removing_host_pairing_revokes_token() {
    let fixture = CredentialFixture::new("");
    let (dyndns, _worker) = service(&fixture, true).await;

    let token = dyndns.issue_token(Some(ALICE), Some("example")).await.unwrap();
    fixture.set_hosts("example:bob\n");
    dyndns.credentials().reload().await.unwrap();

    assert!(matches!(
        dyndns.apply_update(check(&token)).await,
        Err(Error::Authorization(_))
    ));
}

#[tokio::test]
async fn failed_reload_keeps_current_credentials() {
    let fixture = CredentialFixture::new("alice:seed-1\n");
    let (dyndns, _worker) = service(&fixture, true).await;
    let token = dyndns.issue_token(Some(ALICE), Some("example")).await.unwrap();

    // Valid hosts change paired with a broken security file
    fixture.set_hosts("example:bob\n");
    fixture.set_security("this line has no separator\n");
    assert!(dyndns.credentials().reload().await.is_err());

    assert!(
        dyndns.apply_update(check(&token)).await.is_ok(),
        "no part of a failed reload should be visible"
    );
}
