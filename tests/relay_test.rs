use helios::error::{HeliosError, Result};
use helios::relay::{DryRunOutput, RelayActuator, RelayOutput, RelayState, SysfsGpioOutput};
use std::fs;
use std::sync::{Arc, Mutex};

#[derive(Clone, Default)]
struct MockOutput {
    writes: Arc<Mutex<Vec<bool>>>,
    fail: bool,
}

#[async_trait::async_trait]
impl RelayOutput for MockOutput {
    fn describe(&self) -> String {
        "mock".to_string()
    }

    async fn initialize(&mut self) -> Result<()> {
        Ok(())
    }

    async fn write(&mut self, on: bool) -> Result<()> {
        if self.fail {
            return Err(HeliosError::hardware_fault("mock write failed"));
        }
        self.writes.lock().unwrap().push(on);
        Ok(())
    }
}

#[tokio::test]
async fn actuator_only_writes_on_change() {
    let output = MockOutput::default();
    let mut relay = RelayActuator::new(output.clone());
    relay.initialize().await.unwrap();

    assert!(relay.apply(RelayState::On).await.unwrap());
    assert!(!relay.apply(RelayState::On).await.unwrap());
    assert!(relay.apply(RelayState::Off).await.unwrap());
    assert!(!relay.apply(RelayState::Off).await.unwrap());

    assert_eq!(*output.writes.lock().unwrap(), vec![false, true, false]);
}

#[tokio::test]
async fn failed_write_keeps_believed_state() {
    let output = MockOutput {
        fail: true,
        ..Default::default()
    };
    let mut relay = RelayActuator::new(output);
    let err = relay.apply(RelayState::On).await.unwrap_err();
    assert!(matches!(err, HeliosError::Actuation { .. }));
    assert_eq!(relay.state(), RelayState::Off);
}

#[tokio::test]
async fn force_off_writes_even_when_already_off() {
    let output = MockOutput::default();
    let mut relay = RelayActuator::new(output.clone());
    relay.force_off().await.unwrap();
    relay.force_off().await.unwrap();
    assert_eq!(*output.writes.lock().unwrap(), vec![false, false]);
}

#[tokio::test]
async fn sysfs_output_writes_direction_and_levels() {
    let root = tempfile::tempdir().unwrap();
    let pin_dir = root.path().join("gpio27");
    fs::create_dir(&pin_dir).unwrap();

    let mut relay = RelayActuator::new(SysfsGpioOutput::new(27, root.path(), false));
    relay.initialize().await.unwrap();
    assert_eq!(fs::read_to_string(pin_dir.join("direction")).unwrap(), "low");
    assert_eq!(fs::read_to_string(pin_dir.join("value")).unwrap(), "0");

    relay.apply(RelayState::On).await.unwrap();
    assert_eq!(fs::read_to_string(pin_dir.join("value")).unwrap(), "1");
}

#[tokio::test]
async fn sysfs_output_active_low_inverts_levels() {
    let root = tempfile::tempdir().unwrap();
    let pin_dir = root.path().join("gpio17");
    fs::create_dir(&pin_dir).unwrap();

    let mut output = SysfsGpioOutput::new(17, root.path(), true);
    output.initialize().await.unwrap();
    assert_eq!(fs::read_to_string(pin_dir.join("direction")).unwrap(), "high");

    output.write(true).await.unwrap();
    assert_eq!(fs::read_to_string(pin_dir.join("value")).unwrap(), "0");
    output.write(false).await.unwrap();
    assert_eq!(fs::read_to_string(pin_dir.join("value")).unwrap(), "1");
}

#[tokio::test]
async fn sysfs_output_missing_tree_is_hardware_fault() {
    let root = tempfile::tempdir().unwrap();
    let mut output = SysfsGpioOutput::new(5, root.path().join("no-such-dir"), false);
    let err = output.initialize().await.unwrap_err();
    assert!(matches!(err, HeliosError::Actuation { .. }));
}

#[tokio::test]
async fn dry_run_never_fails() {
    let mut relay = RelayActuator::new(DryRunOutput::new());
    relay.initialize().await.unwrap();
    assert!(relay.apply(RelayState::On).await.unwrap());
    relay.force_off().await.unwrap();
    assert_eq!(relay.state(), RelayState::Off);
}
