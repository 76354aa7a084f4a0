//! User registration through the simulated certificate authority.

use fabric_client::{
    ca::CaError,
    error::RegistrationError,
    membership::{IdentityStore, MembershipClient},
    simulator::{SimulatedNetwork, DEFAULT_CA_ADMIN, DEFAULT_CA_ADMIN_SECRET},
};
use fabric_common::identity::Identity;
use std::sync::Arc;
use tempfile::TempDir;

const AFFILIATION: &str = "org1.department1";
const MSP_ID: &str = "ClinicMSP";

async fn registrar(network: &SimulatedNetwork, store: &IdentityStore) -> Arc<Identity> {
    MembershipClient::enroll_admin(
        network,
        store,
        DEFAULT_CA_ADMIN,
        DEFAULT_CA_ADMIN_SECRET,
        AFFILIATION,
        MSP_ID,
    )
    .await
    .unwrap()
}

async fn client(network: &SimulatedNetwork, store: Arc<IdentityStore>) -> MembershipClient {
    let admin = registrar(network, &store).await;
    MembershipClient::new(Arc::new(network.clone()), store, admin, AFFILIATION, MSP_ID)
}

#[tokio::test]
async fn test_register_new_user() {
    let network = SimulatedNetwork::new();
    let client = client(&network, Arc::new(IdentityStore::in_memory())).await;

    let identity = client.register("user1").await.unwrap();
    assert_eq!(identity.name(), "user1");
    assert_eq!(identity.msp_id(), MSP_ID);
    assert_eq!(identity.affiliation(), AFFILIATION);
    assert!(identity.certificate_pem().contains("CN=user1"));
    assert!(client.store().contains("user1"));
    assert_eq!(network.registration_count(), 1);
}

#[tokio::test]
async fn test_known_user_rejected_before_ca() {
    let network = SimulatedNetwork::new();
    let client = client(&network, Arc::new(IdentityStore::in_memory())).await;
    client.register("user1").await.unwrap();

    assert!(matches!(
        client.register("user1").await,
        Err(RegistrationError::AlreadyRegistered(name)) if name == "user1"
    ));
    assert_eq!(network.registration_count(), 1);
}

#[tokio::test]
async fn test_concurrent_registration_of_one_name() {
    let network = SimulatedNetwork::new();
    let client = client(&network, Arc::new(IdentityStore::in_memory())).await;

    let (a, b) = tokio::join!(client.register("bob"), client.register("bob"));
    let registered = [&a, &b].iter().filter(|result| result.is_ok()).count();
    assert_eq!(registered, 1);
    assert!([a, b]
        .into_iter()
        .any(|result| matches!(result, Err(RegistrationError::AlreadyRegistered(_)))));
    assert_eq!(network.registration_count(), 1);
}

#[tokio::test]
async fn test_ca_unreachable() {
    let network = SimulatedNetwork::new();
    let client = client(&network, Arc::new(IdentityStore::in_memory())).await;
    network.set_ca_reachable(false);

    assert!(matches!(
        client.register("user1").await,
        Err(RegistrationError::Register {
            source: CaError::Unreachable(_),
            ..
        })
    ));
    assert!(!client.store().contains("user1"));

    network.set_ca_reachable(true);
    client.register("user1").await.unwrap();
}

#[tokio::test]
async fn test_registrar_must_be_admin() {
    let network = SimulatedNetwork::new();
    let store = Arc::new(IdentityStore::in_memory());
    let admin_client = client(&network, Arc::clone(&store)).await;
    let user = admin_client.register("user1").await.unwrap();

    let user_client =
        MembershipClient::new(Arc::new(network.clone()), store, user, AFFILIATION, MSP_ID);
    assert!(matches!(
        user_client.register("user2").await,
        Err(RegistrationError::Register {
            source: CaError::Unauthorized(_),
            ..
        })
    ));
}

#[tokio::test]
async fn test_invalid_names() {
    let network = SimulatedNetwork::new();
    let client = client(&network, Arc::new(IdentityStore::in_memory())).await;

    for name in ["", "user one", "../etc/passwd"] {
        assert!(matches!(
            client.register(name).await,
            Err(RegistrationError::InvalidName(_))
        ));
    }
    assert_eq!(network.registration_count(), 0);
}

#[tokio::test]
async fn test_admin_enrollment() {
    let network = SimulatedNetwork::new();
    let store = IdentityStore::in_memory();

    assert!(matches!(
        MembershipClient::enroll_admin(&network, &store, DEFAULT_CA_ADMIN, "wrong", AFFILIATION, MSP_ID)
            .await,
        Err(RegistrationError::Enroll {
            source: CaError::InvalidSecret(_),
            ..
        })
    ));

    let first = registrar(&network, &store).await;
    let second = registrar(&network, &store).await;
    assert!(Arc::ptr_eq(&first, &second));
    // Wrong secret attempt plus a single successful enrollment
    assert_eq!(network.enrollment_count(), 2);
}

#[tokio::test]
async fn test_identities_survive_reopening_the_store() {
    let network = SimulatedNetwork::new();
    let dir = TempDir::new().unwrap();

    {
        let store = Arc::new(IdentityStore::open(dir.path()).unwrap());
        let client = client(&network, store).await;
        client.register("user1").await.unwrap();
    }

    let store = Arc::new(IdentityStore::open(dir.path()).unwrap());
    assert!(store.contains(DEFAULT_CA_ADMIN));
    let user = store.get("user1").unwrap();
    assert_eq!(user.msp_id(), MSP_ID);

    // Already known from a previous run
    let client = client(&network, store).await;
    assert!(matches!(
        client.register("user1").await,
        Err(RegistrationError::AlreadyRegistered(_))
    ));
}
