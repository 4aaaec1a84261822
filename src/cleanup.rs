use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Result};
use log::{debug, info};

#[derive(Default)]
pub struct CleanupManager {
    cleanups: Vec<(String, Box<dyn FnOnce() + Send + Sync>)>,
}

impl CleanupManager {
    pub fn new() -> Self {
        CleanupManager::default()
    }

    pub fn push_cleanup<F>(&mut self, name: String, cleanup: F)
    where
        F: FnOnce() + Send + Sync + 'static,
    {
        self.cleanups.push((name, Box::new(cleanup)));
    }

    /// Runs the most recent cleanups first.
    pub fn run_cleanups(&mut self) {
        while let Some((name, cleanup)) = self.cleanups.pop() {
            debug!("Running cleanup <{}>", name);
            cleanup();
        }
    }
}

/// On ctrl-c, runs the registered cleanups and exits with status 130.
pub fn install_ctrlc_handler(cleanup_manager: Arc<Mutex<CleanupManager>>) -> Result<()> {
    ctrlc::set_handler(move || {
        info!("Interrupted, cleaning up");
        if let Ok(mut manager) = cleanup_manager.lock() {
            manager.run_cleanups();
        }
        std::process::exit(130);
    })
    .map_err(|e| anyhow!("Error installing ctrl-c handler: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cleanups_run_in_reverse_once() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let mut manager = CleanupManager::new();
        for name in ["first", "second"] {
            let order = order.clone();
            manager.push_cleanup(name.to_string(), move || order.lock().unwrap().push(name));
        }
        manager.run_cleanups();
        manager.run_cleanups();
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }
}
