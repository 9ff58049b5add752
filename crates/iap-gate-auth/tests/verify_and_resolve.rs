//! Verification and user resolution working together against a mocked key
//! endpoint and a real `RocksDB` store.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::HashMap;
use std::sync::Arc;

use iap_gate_auth::{
    testutil, AuthError, IapVerifier, IdentityResolver, KeyStore, TokenVerifier, VerifierConfig,
};
use iap_gate_store::RocksStore;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const KEY_PATH: &str = "/iap/verify/public_key";

async fn key_server(expected_fetches: u64) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path(KEY_PATH))
        .respond_with(ResponseTemplate::new(200).set_body_json(testutil::key_set(&[(
            testutil::PRIMARY_KID,
            testutil::PRIMARY_PUBLIC_PEM,
        )])))
        .expect(expected_fetches)
        .mount(&server)
        .await;
    server
}

/// Build a configuration the way the server does, from `AUTH_IAP_*` names.
fn config_from_env_vars(server: &MockServer, extra: &[(&str, &str)]) -> VerifierConfig {
    let endpoint = format!("{}{KEY_PATH}", server.uri());
    let mut vars: HashMap<String, String> = HashMap::from([
        ("PROJECT_ID".to_string(), testutil::PROJECT_ID.to_string()),
        (
            "PROJECT_NUMERIC_ID".to_string(),
            testutil::PROJECT_NUMERIC_ID.to_string(),
        ),
        ("PUBLIC_KEY_ENDPOINT".to_string(), endpoint),
        ("TIMEOUT".to_string(), "2".to_string()),
    ]);
    for (name, value) in extra {
        vars.insert((*name).to_string(), (*value).to_string());
    }
    VerifierConfig::from_lookup(|name| vars.get(name).cloned()).unwrap()
}

#[tokio::test]
async fn verified_subject_becomes_local_user() {
    let server = key_server(1).await;
    let config = config_from_env_vars(
        &server,
        &[
            ("USERNAME_FIELD_FROM_CLAIM", "sub"),
            ("USERS_IS_SUPERUSER", "accounts.google.com:118234567890123456789"),
        ],
    );
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(RocksStore::open(dir.path()).unwrap());

    let verifier = IapVerifier::from_config(&config).unwrap();
    let resolver = IdentityResolver::new(Arc::clone(&store), &config);

    let claims = testutil::claims(&config.audience(), "a@x.com");
    let token = testutil::sign(testutil::PRIMARY_KID, testutil::PRIMARY_PRIVATE_PEM, &claims);

    let verified = verifier.verify(&token).await.unwrap();
    let user = resolver.resolve(&verified).unwrap();
    assert_eq!(user.username, "accounts.google.com:118234567890123456789");
    assert_eq!(user.email, "a@x.com");
    assert!(user.is_superuser);
    assert!(!user.is_staff);

    let again = resolver.resolve(&verifier.verify(&token).await.unwrap()).unwrap();
    assert_eq!(again.id, user.id);
    assert_eq!(again.created_at, user.created_at);

    let stored = resolver.get_user(&user.id).unwrap().unwrap();
    assert_eq!(stored, again);
}

#[tokio::test]
async fn shared_key_store_serves_several_verifiers() {
    let server = key_server(1).await;
    let config = config_from_env_vars(&server, &[]);
    let keys = Arc::new(KeyStore::from_config(&config).unwrap());

    let first = IapVerifier::new(&config, Arc::clone(&keys));
    let second = IapVerifier::new(&config, Arc::clone(&keys));

    let claims = testutil::claims(&config.audience(), "a@x.com");
    let token = testutil::sign(testutil::PRIMARY_KID, testutil::PRIMARY_PRIVATE_PEM, &claims);

    first.verify(&token).await.unwrap();
    second.verify(&token).await.unwrap();
    assert!(keys.is_populated());
}

#[tokio::test]
async fn username_taken_by_other_email_is_store_failure() {
    let server = key_server(1).await;
    // Username and email come from different claims, so one username can
    // arrive with two emails.
    let config = config_from_env_vars(&server, &[("USERNAME_FIELD_FROM_CLAIM", "hd")]);
    let dir = tempfile::tempdir().unwrap();
    let resolver = IdentityResolver::new(RocksStore::open(dir.path()).unwrap(), &config);
    let verifier = IapVerifier::from_config(&config).unwrap();

    let sign_for = |email: &str| {
        let claims = testutil::claims(&config.audience(), email);
        testutil::sign(testutil::PRIMARY_KID, testutil::PRIMARY_PRIVATE_PEM, &claims)
    };

    let first = verifier.verify(&sign_for("a@x.com")).await.unwrap();
    assert_eq!(resolver.resolve(&first).unwrap().username, "x.com");

    let second = verifier.verify(&sign_for("b@x.com")).await.unwrap();
    let result = resolver.resolve(&second);
    assert!(matches!(result, Err(AuthError::StoreUnavailable(_))));
}
