//! Serialises the heavy concurrent tests so they don't starve each other of cores.
use crate::loom_bindings::sync::Mutex;

pub(crate) static TEST_LOCK: Mutex<()> = Mutex::new(());
