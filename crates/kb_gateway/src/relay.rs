//! Relay wiring: open the store and construct the components.

use std::sync::Arc;

use kb_crypto::Rsa2048Generator;
use kb_store::Store;

use crate::{
    error::GatewayError, gateway::RelayGateway, identity_map::IdentityMap, keystore::KeyStore,
    settings::RelaySettings,
};

/// One fully-wired relay instance. Components hold the same store handle;
/// there is no ambient registry to reach through.
#[derive(Clone)]
pub struct Relay {
    pub store: Store,
    pub keystore: KeyStore,
    pub identities: IdentityMap,
    pub gateway: RelayGateway,
}

impl Relay {
    /// Open the database, run migrations, provision the configured
    /// applications, and wire the components together.
    pub async fn open(settings: &RelaySettings) -> Result<Relay, GatewayError> {
        Self::open_with_generator(settings, Arc::new(Rsa2048Generator)).await
    }

    /// Like [`Relay::open`], with an injected key-pair generator.
    pub async fn open_with_generator(
        settings: &RelaySettings,
        generator: Arc<dyn kb_crypto::KeyPairGenerator>,
    ) -> Result<Relay, GatewayError> {
        let store = Store::open(&settings.db_path).await?;
        let keystore = KeyStore::new(store.clone(), generator);
        let identities = IdentityMap::new(store.clone());
        let gateway = RelayGateway::new(store.clone(), keystore.clone(), identities.clone());

        let relay = Relay {
            store,
            keystore,
            identities,
            gateway,
        };
        for application in &settings.applications {
            relay.identities.provision(application).await?;
        }
        Ok(relay)
    }
}
