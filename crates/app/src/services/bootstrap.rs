//! Connection bootstrapper — turns a stored entry into a live, verified
//! device session.
//!
//! Every failure leaves this module as a [`BootstrapError`]. A broken stored
//! connection config is never one of them: it is logged and replaced by
//! defaults.

use devlink_domain::descriptor::DeviceDescriptor;
use devlink_domain::device_config::{ConnectConfig, DeviceConfig};
use devlink_domain::entry::DeviceEntry;
use devlink_domain::error::{BootstrapError, ProtocolError, TransientReason};
use devlink_domain::mac::MacAddress;

use crate::context::LinkContext;
use crate::ports::{DeviceProtocol, DeviceSession};

/// A session whose device identity matched the entry.
pub struct Connected<S> {
    pub session: S,
    pub host: String,
    pub mac: MacAddress,
}

pub type ConnectionAttempt<S> = Result<Connected<S>, BootstrapError>;

pub struct ConnectionBootstrapper<P> {
    protocol: P,
}

impl<P: DeviceProtocol> ConnectionBootstrapper<P> {
    pub fn new(protocol: P) -> Self {
        Self { protocol }
    }

    /// Locate, connect to, and verify the device behind `entry`.
    ///
    /// # Errors
    ///
    /// - [`BootstrapError::Authentication`] when the device rejects the
    ///   credentials.
    /// - [`BootstrapError::IdentityMismatch`] when the device reached is not
    ///   the one the entry was created for. The session is closed first.
    /// - [`BootstrapError::Transient`] for everything else, including a
    ///   device that discovery has not seen yet.
    #[tracing::instrument(
        skip(self, entry, context),
        fields(entry_id = %entry.id, mac = %entry.unique_id)
    )]
    pub async fn bootstrap(
        &self,
        entry: &DeviceEntry,
        context: &LinkContext,
    ) -> ConnectionAttempt<P::Session> {
        let probed = self.locate(entry, context).await?;
        let config = connect_config(entry, &probed, context);
        let host = config.host.clone();
        let timeout = config.timeout;
        tracing::debug!(?config, "connecting");

        let session = tokio::time::timeout(timeout, self.protocol.connect(config))
            .await
            .map_err(|_| ProtocolError::Timeout { host: host.clone() })??;

        let found = session.descriptor().mac;
        if found != entry.unique_id {
            session.close().await;
            let err = BootstrapError::IdentityMismatch {
                host,
                expected: entry.unique_id,
                found,
            };
            tracing::warn!(%err, "refusing to bind entry to another device");
            return Err(err);
        }

        tracing::debug!(%host, "device connected");
        Ok(Connected {
            session,
            host,
            mac: found,
        })
    }

    async fn locate(
        &self,
        entry: &DeviceEntry,
        context: &LinkContext,
    ) -> Result<DeviceDescriptor, BootstrapError> {
        if let Some(host) = entry.host.as_deref() {
            let probe = self.protocol.discover_single(host);
            return tokio::time::timeout(context.connect_timeout(), probe)
                .await
                .map_err(|_| ProtocolError::Timeout {
                    host: host.to_string(),
                })?
                .map_err(BootstrapError::from);
        }
        context.cache().find_by_mac(entry.unique_id).ok_or(
            BootstrapError::Transient(TransientReason::NotDiscovered {
                mac: entry.unique_id,
            }),
        )
    }
}

/// Resolve connect parameters. Credentials come from the entry, then the
/// stored config, then the shared credentials of the context.
fn connect_config(
    entry: &DeviceEntry,
    probed: &DeviceDescriptor,
    context: &LinkContext,
) -> ConnectConfig {
    let host = probed.host.clone();
    let stored = entry
        .device_config
        .as_ref()
        .and_then(|blob| match DeviceConfig::parse(&host, blob) {
            Ok(config) => Some(config),
            Err(err) => {
                tracing::warn!(%err, "ignoring stored connection config");
                None
            }
        });

    let mut config = match stored {
        Some(stored) => {
            let explicit_timeout = stored.timeout_secs.is_some();
            let mut config = ConnectConfig::from_device_config(host, stored);
            if !explicit_timeout {
                config.timeout = context.connect_timeout();
            }
            config
        }
        None => {
            let mut config = ConnectConfig::new(host);
            config.connection_type.clone_from(&probed.connection_type);
            config.timeout = context.connect_timeout();
            config
        }
    };

    config.credentials = entry
        .credentials
        .clone()
        .or(config.credentials.take())
        .or_else(|| context.shared_credentials());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProtocol, capture_logs, descriptor};
    use devlink_domain::descriptor::DeviceKind;
    use devlink_domain::device_config::{ConnectionType, EncryptionType};
    use devlink_domain::entry::Credentials;
    use devlink_domain::error::AttemptOutcome;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;

    const HOST: &str = "127.0.0.1";
    const MAC: &str = "aa:bb:cc:dd:ee:ff";

    fn plug() -> DeviceDescriptor {
        descriptor(HOST, MAC, DeviceKind::Plug)
    }

    fn entry() -> DeviceEntry {
        DeviceEntry::builder()
            .host(HOST)
            .unique_id(MAC.parse().unwrap())
            .build()
            .unwrap()
    }

    fn setup() -> (Arc<FakeProtocol>, ConnectionBootstrapper<Arc<FakeProtocol>>) {
        let protocol = Arc::new(FakeProtocol::default().with_device(plug()));
        let bootstrapper = ConnectionBootstrapper::new(Arc::clone(&protocol));
        (protocol, bootstrapper)
    }

    #[tokio::test]
    async fn should_connect_to_configured_host() {
        let (protocol, bootstrapper) = setup();
        let context = LinkContext::default();

        let connected = bootstrapper.bootstrap(&entry(), &context).await.unwrap();

        assert_eq!(connected.host, HOST);
        assert_eq!(connected.mac, MAC.parse().unwrap());
        assert_eq!(protocol.open_sessions(), 1);
        assert!(context.cache().is_empty());
    }

    #[tokio::test]
    async fn should_reject_device_with_other_mac_and_close_session() {
        let (protocol, bootstrapper) = setup();
        let mut entry = entry();
        entry.unique_id = "aa:bb:cc:dd:ee:f0".parse().unwrap();

        let Err(err) = bootstrapper
            .bootstrap(&entry, &LinkContext::default())
            .await
        else {
            panic!("expected identity mismatch");
        };

        assert_eq!(err.outcome(), AttemptOutcome::TransientFailure);
        assert_eq!(
            err.to_string(),
            "unexpected device found at 127.0.0.1; expected aa:bb:cc:dd:ee:f0, found aa:bb:cc:dd:ee:ff"
        );
        assert_eq!(protocol.open_sessions(), 0);
    }

    #[tokio::test]
    async fn should_fall_back_to_defaults_for_invalid_stored_config() {
        let (protocol, bootstrapper) = setup();
        let mut entry = entry();
        entry.device_config = Some(json!({"foo": "bar"}));

        let result = bootstrapper.bootstrap(&entry, &LinkContext::default()).await;

        assert!(result.is_ok());
        let connects = protocol.connects();
        assert_eq!(connects.len(), 1);
        assert_eq!(connects[0], ConnectConfig::new(HOST));
    }

    #[tokio::test]
    async fn should_log_host_and_payload_of_invalid_stored_config() {
        let (_protocol, bootstrapper) = setup();
        let mut entry = entry();
        entry.device_config = Some(json!({"foo": "bar"}));
        let (_guard, logs) = capture_logs();

        bootstrapper
            .bootstrap(&entry, &LinkContext::default())
            .await
            .unwrap();

        let logs = logs.contents();
        assert!(logs.contains("WARN"), "{logs}");
        assert!(
            logs.contains(r#"invalid connection config for 127.0.0.1: {"foo":"bar"}"#),
            "{logs}"
        );
    }

    #[tokio::test]
    async fn should_log_both_addresses_on_identity_mismatch() {
        let (_protocol, bootstrapper) = setup();
        let mut entry = entry();
        entry.unique_id = "aa:bb:cc:dd:ee:f0".parse().unwrap();
        let (_guard, logs) = capture_logs();

        let result = bootstrapper.bootstrap(&entry, &LinkContext::default()).await;

        assert!(result.is_err());
        let logs = logs.contents();
        assert!(
            logs.contains(
                "unexpected device found at 127.0.0.1; expected aa:bb:cc:dd:ee:f0, found aa:bb:cc:dd:ee:ff"
            ),
            "{logs}"
        );
    }

    #[tokio::test]
    async fn should_pass_stored_config_and_credentials_to_connect() {
        let (protocol, bootstrapper) = setup();
        let mut entry = entry();
        entry.device_config = Some(json!({
            "connection_type": {
                "device_family": "SMART.TAPOPLUG",
                "encryption_type": "KLAP",
                "login_version": 2
            },
            "uses_http": true
        }));
        entry.credentials = Some(Credentials::new("fake_username", "fake_password"));

        bootstrapper
            .bootstrap(&entry, &LinkContext::default())
            .await
            .unwrap();

        let connect = &protocol.connects()[0];
        assert_eq!(
            connect.connection_type,
            Some(ConnectionType {
                device_family: "SMART.TAPOPLUG".to_string(),
                encryption_type: EncryptionType::Klap,
                login_version: Some(2),
            })
        );
        assert!(connect.uses_http);
        assert_eq!(
            connect.credentials,
            Some(Credentials::new("fake_username", "fake_password"))
        );
    }

    #[tokio::test]
    async fn should_inject_shared_credentials_when_entry_has_none() {
        let (protocol, bootstrapper) = setup();
        let context =
            LinkContext::default().with_shared_credentials(Credentials::new("shared", "secret"));

        bootstrapper.bootstrap(&entry(), &context).await.unwrap();

        assert_eq!(
            protocol.connects()[0].credentials,
            Some(Credentials::new("shared", "secret"))
        );
    }

    #[tokio::test]
    async fn should_prefer_entry_credentials_over_shared() {
        let (protocol, bootstrapper) = setup();
        let context =
            LinkContext::default().with_shared_credentials(Credentials::new("shared", "secret"));
        let mut entry = entry();
        entry.credentials = Some(Credentials::new("own", "pass"));

        bootstrapper.bootstrap(&entry, &context).await.unwrap();

        assert_eq!(
            protocol.connects()[0].credentials,
            Some(Credentials::new("own", "pass"))
        );
    }

    #[tokio::test]
    async fn should_use_context_timeout_without_stored_one() {
        let (protocol, bootstrapper) = setup();
        let context = LinkContext::new(Duration::from_secs(9));

        bootstrapper.bootstrap(&entry(), &context).await.unwrap();

        assert_eq!(protocol.connects()[0].timeout, Duration::from_secs(9));
    }

    #[tokio::test]
    async fn should_map_authentication_failure() {
        let (protocol, bootstrapper) = setup();
        protocol.fail_connect(Some(ProtocolError::Authentication {
            host: HOST.to_string(),
        }));

        let Err(err) = bootstrapper
            .bootstrap(&entry(), &LinkContext::default())
            .await
        else {
            panic!("expected authentication failure");
        };

        assert_eq!(err.outcome(), AttemptOutcome::AuthFailure);
    }

    #[tokio::test]
    async fn should_map_unreachable_host_to_transient() {
        let (protocol, bootstrapper) = setup();
        protocol.remove_device(HOST);

        let Err(err) = bootstrapper
            .bootstrap(&entry(), &LinkContext::default())
            .await
        else {
            panic!("expected transient failure");
        };

        assert_eq!(err.outcome(), AttemptOutcome::TransientFailure);
        assert_eq!(err.reason(), "device_error");
    }

    #[tokio::test]
    async fn should_locate_hostless_entry_through_cache() {
        let (protocol, bootstrapper) = setup();
        let context = LinkContext::default();
        context.cache().merge([plug()]);
        let mut entry = entry();
        entry.host = None;

        let connected = bootstrapper.bootstrap(&entry, &context).await.unwrap();

        assert_eq!(connected.host, HOST);
        assert_eq!(protocol.connects().len(), 1);
    }

    #[tokio::test]
    async fn should_fail_transiently_when_hostless_entry_not_discovered() {
        let (protocol, bootstrapper) = setup();
        let mut entry = entry();
        entry.host = None;

        let Err(err) = bootstrapper
            .bootstrap(&entry, &LinkContext::default())
            .await
        else {
            panic!("expected not discovered");
        };

        assert_eq!(err.reason(), "not_discovered");
        assert!(protocol.connects().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn should_time_out_hanging_connect() {
        let (protocol, bootstrapper) = setup();
        protocol.hold_connect();

        let Err(err) = bootstrapper
            .bootstrap(&entry(), &LinkContext::default())
            .await
        else {
            panic!("expected timeout");
        };

        assert_eq!(
            err,
            BootstrapError::Transient(TransientReason::Timeout {
                host: HOST.to_string()
            })
        );
    }
}
