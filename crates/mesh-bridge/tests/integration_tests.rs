//! Integration tests for the bridge manager
//!
//! These tests drive real child processes (`sleep` standing in for the
//! forwarder) to verify:
//! - Bridge start/stop and liveness polling
//! - Registry conflict detection on devices and ports
//! - Port allocation against live bridges
//! - mDNS registration lifecycle

use std::net::{IpAddr, Ipv4Addr};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mesh_bridge::{
    Bridge, BridgeConfig, BridgeError, BridgeRegistry, Forwarder, Registrar, Registration,
    ServiceRecord,
};
use mesh_detect::{Device, NodeIdentity};
use tokio::process::{Child, Command};

// ============================================================================
// Helper Functions
// ============================================================================

mod helpers {
    use super::*;

    /// Forwarder that runs `sleep` instead of socat
    pub struct SleepForwarder;

    impl Forwarder for SleepForwarder {
        fn program(&self) -> &str {
            "sleep"
        }

        fn configure_line(&self, _device_path: &str, _baud_rate: u32) -> Result<(), BridgeError> {
            Ok(())
        }

        fn spawn(&self, _device_path: &str, _tcp_port: u16) -> Result<Child, BridgeError> {
            Command::new("sleep")
                .arg("30")
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| BridgeError::Spawn {
                    program: "sleep".into(),
                    source,
                })
        }
    }

    /// Forwarder whose line configuration always fails
    pub struct BadLineForwarder;

    impl Forwarder for BadLineForwarder {
        fn program(&self) -> &str {
            "sleep"
        }

        fn configure_line(&self, device_path: &str, _baud_rate: u32) -> Result<(), BridgeError> {
            Err(BridgeError::LineConfig {
                device: device_path.into(),
                reason: "no such device".into(),
            })
        }

        fn spawn(&self, _device_path: &str, _tcp_port: u16) -> Result<Child, BridgeError> {
            panic!("spawn must not run after a line configuration failure");
        }
    }

    /// Forwarder whose program does not exist
    pub struct MissingForwarder;

    impl Forwarder for MissingForwarder {
        fn program(&self) -> &str {
            "definitely-not-socat"
        }

        fn configure_line(&self, _device_path: &str, _baud_rate: u32) -> Result<(), BridgeError> {
            Ok(())
        }

        fn spawn(&self, _device_path: &str, _tcp_port: u16) -> Result<Child, BridgeError> {
            Command::new("definitely-not-socat")
                .kill_on_drop(true)
                .spawn()
                .map_err(|source| BridgeError::Spawn {
                    program: "definitely-not-socat".into(),
                    source,
                })
        }
    }

    /// Registrar that records what it was asked to publish
    #[derive(Default)]
    pub struct RecordingRegistrar {
        pub fail: bool,
        pub published: Arc<Mutex<Vec<ServiceRecord>>>,
        pub withdrawn: Arc<Mutex<Vec<String>>>,
        /// Forwarder to check on when a record is withdrawn
        pub watched_pid: Arc<Mutex<Option<u32>>>,
        /// Whether the watched forwarder still existed at each withdrawal
        pub alive_at_withdrawal: Arc<Mutex<Vec<bool>>>,
    }

    struct RecordingRegistration {
        instance_name: String,
        withdrawn: Arc<Mutex<Vec<String>>>,
        watched_pid: Arc<Mutex<Option<u32>>>,
        alive_at_withdrawal: Arc<Mutex<Vec<bool>>>,
    }

    impl Registrar for RecordingRegistrar {
        fn local_address(&self) -> Result<IpAddr, BridgeError> {
            Ok(IpAddr::V4(Ipv4Addr::LOCALHOST))
        }

        fn register(&self, record: &ServiceRecord) -> Result<Box<dyn Registration>, BridgeError> {
            if self.fail {
                return Err(BridgeError::Registration("multicast unavailable".into()));
            }
            self.published.lock().unwrap().push(record.clone());
            Ok(Box::new(RecordingRegistration {
                instance_name: record.instance_name.clone(),
                withdrawn: self.withdrawn.clone(),
                watched_pid: self.watched_pid.clone(),
                alive_at_withdrawal: self.alive_at_withdrawal.clone(),
            }))
        }
    }

    impl Registration for RecordingRegistration {
        fn unregister(self: Box<Self>) -> Result<(), BridgeError> {
            if let Some(pid) = *self.watched_pid.lock().unwrap() {
                self.alive_at_withdrawal
                    .lock()
                    .unwrap()
                    .push(process_exists(pid));
            }
            self.withdrawn.lock().unwrap().push(self.instance_name);
            Ok(())
        }
    }

    pub fn registry() -> BridgeRegistry {
        BridgeRegistry::new(Arc::new(SleepForwarder), None).with_config(fast_config())
    }

    pub fn fast_config() -> BridgeConfig {
        BridgeConfig {
            stop_grace: Duration::from_millis(500),
            ..Default::default()
        }
    }

    pub fn device(path: &str) -> Device {
        Device::new(path, "USB Serial Adapter")
    }

    pub fn identified_device(path: &str) -> Device {
        let mut device = device(path);
        device.identity = Some(NodeIdentity::from_node_num(
            0x3c7f9d4e,
            Some("Base Camp".into()),
        ));
        device
    }

    /// Kill a process behind the manager's back
    pub fn kill_externally(pid: u32) {
        let status = std::process::Command::new("kill")
            .args(["-KILL", &pid.to_string()])
            .status()
            .unwrap();
        assert!(status.success());
    }

    /// `kill -0`: true until the process has been reaped
    pub fn process_exists(pid: u32) -> bool {
        std::process::Command::new("kill")
            .args(["-0", &pid.to_string()])
            .stderr(Stdio::null())
            .status()
            .unwrap()
            .success()
    }

    /// Poll until the bridge reports not running (or give up)
    pub async fn wait_until_exited(bridge: &mut Bridge) -> bool {
        for _ in 0..100 {
            if !bridge.is_running() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        false
    }
}

// ============================================================================
// Bridge Lifecycle Tests
// ============================================================================

mod bridge_tests {
    use super::helpers::*;
    use super::*;

    #[tokio::test]
    async fn start_spawns_forwarder() {
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, None, fast_config());
        assert!(!bridge.is_running());

        bridge.start(&SleepForwarder, None).unwrap();

        assert!(bridge.is_running());
        assert!(bridge.pid().is_some());
        assert!(!bridge.is_announced());

        bridge.stop().await;
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, None, fast_config());
        bridge.start(&SleepForwarder, None).unwrap();

        bridge.stop().await;
        assert!(!bridge.is_running());
        assert!(bridge.pid().is_none());

        bridge.stop().await;
        assert!(!bridge.is_running());
        assert!(bridge.pid().is_none());
        assert!(!bridge.is_announced());
    }

    #[tokio::test]
    async fn stop_before_start_is_noop() {
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, None, fast_config());
        bridge.stop().await;
        assert!(!bridge.is_running());
    }

    #[tokio::test]
    async fn liveness_follows_external_exit() {
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, None, fast_config());
        bridge.start(&SleepForwarder, None).unwrap();
        assert!(bridge.is_running());

        kill_externally(bridge.pid().unwrap());

        assert!(wait_until_exited(&mut bridge).await);
        // stays down on later polls
        assert!(!bridge.is_running());
        bridge.stop().await;
    }

    #[tokio::test]
    async fn line_config_failure_is_fatal() {
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, None, fast_config());
        let err = bridge.start(&BadLineForwarder, None).unwrap_err();

        assert!(matches!(err, BridgeError::LineConfig { .. }));
        assert!(!bridge.is_running());
    }

    #[tokio::test]
    async fn identified_bridge_is_announced() {
        let registrar = RecordingRegistrar::default();
        let identity = NodeIdentity::from_node_num(0x3c7f9d4e, None);
        let mut bridge = Bridge::new("/dev/ttyACM0", 4405, Some(identity), fast_config());

        bridge.start(&SleepForwarder, Some(&registrar)).unwrap();

        assert!(bridge.is_announced());
        assert_eq!(bridge.mdns_hostname().as_deref(), Some("meshtastic_9d4e.local"));
        {
            let published = registrar.published.lock().unwrap();
            assert_eq!(published.len(), 1);
            assert_eq!(published[0].port, 4405);
            assert_eq!(published[0].address, IpAddr::V4(Ipv4Addr::LOCALHOST));
        }

        bridge.stop().await;
        bridge.stop().await;

        assert!(!bridge.is_announced());
        assert_eq!(
            *registrar.withdrawn.lock().unwrap(),
            vec!["meshtastic_9d4e".to_string()]
        );
    }

    #[tokio::test]
    async fn stop_withdraws_announcement_before_forwarder() {
        let registrar = RecordingRegistrar::default();
        let identity = NodeIdentity::from_node_num(0x3c7f9d4e, None);
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, Some(identity), fast_config());

        bridge.start(&SleepForwarder, Some(&registrar)).unwrap();
        let pid = bridge.pid().unwrap();
        *registrar.watched_pid.lock().unwrap() = Some(pid);

        bridge.stop().await;

        assert_eq!(*registrar.alive_at_withdrawal.lock().unwrap(), vec![true]);
        assert!(!process_exists(pid));
    }

    #[tokio::test]
    async fn unidentified_bridge_is_not_announced() {
        let registrar = RecordingRegistrar::default();
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, None, fast_config());

        bridge.start(&SleepForwarder, Some(&registrar)).unwrap();

        assert!(!bridge.is_announced());
        assert!(registrar.published.lock().unwrap().is_empty());
        bridge.stop().await;
    }

    #[tokio::test]
    async fn registration_failure_is_not_fatal() {
        let registrar = RecordingRegistrar {
            fail: true,
            ..Default::default()
        };
        let identity = NodeIdentity::from_node_num(0x3c7f9d4e, None);
        let mut bridge = Bridge::new("/dev/ttyACM0", 4403, Some(identity), fast_config());

        bridge.start(&SleepForwarder, Some(&registrar)).unwrap();

        assert!(bridge.is_running());
        assert!(!bridge.is_announced());
        bridge.stop().await;
    }
}

// ============================================================================
// Registry Tests
// ============================================================================

mod registry_tests {
    use super::helpers::*;
    use super::*;

    #[tokio::test]
    async fn rejects_second_bridge_for_device() {
        let mut registry = registry();
        registry
            .create_and_start(&device("/dev/ttyUSB0"), 4403)
            .unwrap();

        let err = registry
            .create_and_start(&device("/dev/ttyUSB0"), 4410)
            .unwrap_err();

        match err {
            BridgeError::AlreadyBridged { device, port } => {
                assert_eq!(device, "/dev/ttyUSB0");
                assert_eq!(port, 4403);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(registry.live_bridges().len(), 1);
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn rejects_port_in_use() {
        let mut registry = registry();
        registry
            .create_and_start(&device("/dev/ttyUSB0"), 4403)
            .unwrap();

        let err = registry
            .create_and_start(&device("/dev/ttyUSB1"), 4403)
            .unwrap_err();

        assert!(matches!(err, BridgeError::PortInUse(4403)));
        assert_eq!(registry.len(), 1);
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn accepts_device_and_port_after_forwarder_died() {
        let mut registry = registry();
        let pid = registry
            .create_and_start(&device("/dev/ttyUSB0"), 4403)
            .unwrap()
            .pid()
            .unwrap();

        kill_externally(pid);
        for _ in 0..100 {
            if registry.live_bridges().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }

        assert!(registry.occupied_ports().is_empty());
        assert!(registry.occupied_device_paths().is_empty());
        // dead bridges stay in the collection until stop_all
        assert_eq!(registry.len(), 1);

        registry
            .create_and_start(&device("/dev/ttyUSB0"), 4403)
            .unwrap();
        assert_eq!(registry.live_bridges().len(), 1);
        assert_eq!(registry.len(), 2);
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn accepts_device_and_port_after_stop_all() {
        let mut registry = registry();
        registry
            .create_and_start(&device("/dev/ttyUSB0"), 4403)
            .unwrap();
        registry.stop_all().await;

        registry
            .create_and_start(&device("/dev/ttyUSB0"), 4403)
            .unwrap();
        assert_eq!(registry.occupied_ports().into_iter().collect::<Vec<_>>(), vec![4403]);
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn spawn_failure_leaves_no_bridge() {
        let mut registry =
            BridgeRegistry::new(Arc::new(MissingForwarder), None).with_config(fast_config());

        let err = registry
            .create_and_start(&device("/dev/ttyUSB0"), 4403)
            .unwrap_err();

        assert!(matches!(err, BridgeError::Spawn { .. }));
        assert!(registry.is_empty());
        assert!(registry.live_bridges().is_empty());
    }

    #[tokio::test]
    async fn next_port_skips_live_bridges() {
        let mut registry = registry().with_base_port(5000);
        assert_eq!(registry.next_port(), Some(5000));

        registry.create_and_start(&device("/dev/ttyUSB0"), 5000).unwrap();
        registry.create_and_start(&device("/dev/ttyUSB1"), 5002).unwrap();

        assert_eq!(registry.next_port(), Some(5001));
        registry.stop_all().await;
        assert_eq!(registry.next_port(), Some(5000));
    }

    #[tokio::test]
    async fn next_port_none_when_range_exhausted() {
        let mut registry = registry().with_base_port(u16::MAX);
        registry
            .create_and_start(&device("/dev/ttyUSB0"), u16::MAX)
            .unwrap();

        assert_eq!(registry.next_port(), None);
        registry.stop_all().await;
        assert_eq!(registry.next_port(), Some(u16::MAX));
    }

    #[tokio::test]
    async fn live_bridges_keep_creation_order() {
        let mut registry = registry();
        for (i, path) in ["/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyUSB0"].iter().enumerate() {
            registry
                .create_and_start(&device(path), 4403 + i as u16)
                .unwrap();
        }

        let paths: Vec<_> = registry
            .live_bridges()
            .into_iter()
            .map(|b| b.device_path().to_string())
            .collect();
        assert_eq!(paths, vec!["/dev/ttyUSB1", "/dev/ttyACM0", "/dev/ttyUSB0"]);
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn stop_all_withdraws_announcements() {
        let registrar = Arc::new(RecordingRegistrar::default());
        let mut registry = BridgeRegistry::new(Arc::new(SleepForwarder), Some(registrar.clone()))
            .with_config(fast_config());
        assert!(registry.announces());

        registry
            .create_and_start(&identified_device("/dev/ttyACM0"), 4403)
            .unwrap();
        assert_eq!(registrar.published.lock().unwrap().len(), 1);

        registry.stop_all().await;

        assert_eq!(registrar.withdrawn.lock().unwrap().len(), 1);
        assert!(registry.is_empty());
    }
}

// ============================================================================
// End-to-End Scenario
// ============================================================================

#[tokio::test]
async fn two_devices_end_to_end() {
    let mut registry = helpers::registry();
    let a = helpers::device("/dev/ttyUSB0");
    let b = helpers::device("/dev/ttyUSB1");

    let port_a = registry.next_port().unwrap();
    let pid_a = registry.create_and_start(&a, port_a).unwrap().pid().unwrap();
    assert_eq!(port_a, 4403);

    let port_b = registry.next_port().unwrap();
    let pid_b = registry.create_and_start(&b, port_b).unwrap().pid().unwrap();
    assert_eq!(port_b, 4404);

    let retry_port = registry.next_port().unwrap();
    let err = registry.create_and_start(&a, retry_port).unwrap_err();
    assert!(matches!(
        err,
        BridgeError::AlreadyBridged { port: 4403, .. }
    ));
    assert!(err.to_string().contains("port 4403"));

    registry.stop_all().await;

    assert!(registry.live_bridges().is_empty());
    assert!(registry.is_empty());

    // both forwarders are gone at the OS level too
    for pid in [pid_a, pid_b] {
        assert!(!helpers::process_exists(pid), "forwarder {} still running", pid);
    }
}
