use std::sync::{Arc, Mutex};

use anyhow::Result;

use crate::cleanup::CleanupManager;
use crate::context::Context;

pub(crate) trait Execute {
    async fn execute(
        &self,
        context: Context,
        cleanup_manager: Arc<Mutex<CleanupManager>>,
    ) -> Result<()>;
}
