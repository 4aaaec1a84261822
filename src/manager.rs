use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, error, info, trace, warn};
use parking_lot::Mutex;
use serde_json::{json, Value as JsonValue};

use crate::error::{PluginError, ReadError, RemoteError};
use crate::plugin::{start_plugin_process, Plugin, PluginId, PluginInfo, RunningStateSender};
use crate::rpc::{Handler, ResponseParser, RpcCtx};
use crate::util::{get_operating_system, OperatingSystem};

/// Owns every plugin process started by this host.
pub struct PluginManager {
    state: Arc<Mutex<PluginState>>,
    plugin_id_counter: AtomicI64,
    operating_system: OperatingSystem,
}

impl Default for PluginManager {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginManager {
    pub fn new() -> Self {
        Self::with_operating_system(get_operating_system())
    }

    pub(crate) fn with_operating_system(operating_system: OperatingSystem) -> Self {
        PluginManager {
            state: Arc::new(Mutex::new(PluginState::default())),
            plugin_id_counter: AtomicI64::new(0),
            operating_system,
        }
    }

    fn check_platform(&self) -> Result<(), PluginError> {
        if self.operating_system.is_not_desktop() {
            return Err(PluginError::Unsupported(format!(
                "plugins are not supported on {:?}",
                self.operating_system
            )));
        }
        Ok(())
    }

    fn next_plugin_id(&self) -> PluginId {
        PluginId::from(self.plugin_id_counter.fetch_add(1, Ordering::SeqCst))
    }

    pub async fn create_plugin(
        &self,
        plugin_info: PluginInfo,
        running_state: RunningStateSender,
    ) -> Result<PluginId, PluginError> {
        self.check_platform()?;
        let plugin_id = self.next_plugin_id();
        let weak_state = WeakPluginState(Arc::downgrade(&self.state));
        start_plugin_process(plugin_info, plugin_id, weak_state, running_state).await?;
        Ok(plugin_id)
    }

    pub fn get_plugin(&self, plugin_id: PluginId) -> Result<Weak<Plugin>, PluginError> {
        let state = self.state.lock();
        let plugin = state
            .find(plugin_id)
            .ok_or(PluginError::PluginNotConnected)?;
        Ok(Arc::downgrade(plugin))
    }

    fn upgrade_plugin(&self, plugin_id: PluginId) -> Result<Arc<Plugin>, PluginError> {
        self.get_plugin(plugin_id)?
            .upgrade()
            .ok_or(PluginError::PluginNotConnected)
    }

    /// Unregisters the plugin and shuts its process down.
    pub async fn remove_plugin(&self, plugin_id: PluginId) -> Result<(), PluginError> {
        self.check_platform()?;
        info!("[RPC] removing plugin <{}>", plugin_id);
        let plugin = self.state.lock().take(plugin_id);
        match plugin {
            Some(plugin) => {
                tokio::task::spawn_blocking(move || plugin.shutdown())
                    .await
                    .map_err(|err| PluginError::Internal(err.into()))?;
            }
            None => debug!("[RPC] plugin <{}> was already gone", plugin_id),
        }
        Ok(())
    }

    pub async fn init_plugin(
        &self,
        plugin_id: PluginId,
        init_params: JsonValue,
    ) -> Result<Arc<Plugin>, PluginError> {
        trace!("Init plugin <{}> with <{}>", plugin_id, init_params);
        self.check_platform()?;
        let plugin = self.upgrade_plugin(plugin_id)?;
        if let Err(err) = plugin.initialize(init_params).await {
            error!("[RPC] plugin {} failed to initialize: {}", plugin, err);
            drop(plugin);
            if let Err(remove_err) = self.remove_plugin(plugin_id).await {
                warn!("[RPC] remove plugin <{}> failed: {}", plugin_id, remove_err);
            }
            return Err(err);
        }
        Ok(plugin)
    }

    /// Blocking request, run on the blocking pool so the runtime keeps going.
    pub async fn send_request<P: ResponseParser>(
        &self,
        plugin_id: PluginId,
        method: &str,
        request: JsonValue,
    ) -> Result<P::ValueType, PluginError> {
        let plugin = self.upgrade_plugin(plugin_id)?;
        let method = method.to_string();
        let response = tokio::task::spawn_blocking(move || plugin.request(&method, &request))
            .await
            .map_err(|err| PluginError::Internal(err.into()))??;
        Ok(P::parse_json(response)?)
    }

    pub async fn async_send_request<P: ResponseParser>(
        &self,
        plugin_id: PluginId,
        method: &str,
        request: JsonValue,
    ) -> Result<P::ValueType, PluginError> {
        let plugin = self.upgrade_plugin(plugin_id)?;
        plugin.async_request::<P>(method, &request).await
    }

    pub fn plugin_ids(&self) -> Vec<PluginId> {
        self.state.lock().plugins.iter().map(|p| p.id).collect()
    }

    /// Stops every plugin. Blocks, so it can run from the ctrl-c handler thread.
    pub fn shutdown_all(&self) {
        let plugins = std::mem::take(&mut self.state.lock().plugins);
        for plugin in plugins {
            info!("[RPC] stopping plugin {}", plugin);
            plugin.shutdown();
        }
    }

    #[cfg(test)]
    pub(crate) fn register(&self, plugin: Plugin) {
        self.state.lock().plugin_connect(plugin);
    }

    #[cfg(test)]
    pub(crate) fn weak_state(&self) -> WeakPluginState {
        WeakPluginState(Arc::downgrade(&self.state))
    }

    #[cfg(test)]
    pub(crate) fn allocate_plugin_id(&self) -> PluginId {
        self.next_plugin_id()
    }
}

#[derive(Default)]
pub struct PluginState {
    plugins: Vec<Arc<Plugin>>,
}

impl PluginState {
    fn find(&self, plugin_id: PluginId) -> Option<&Arc<Plugin>> {
        self.plugins.iter().find(|p| p.id == plugin_id)
    }

    fn take(&mut self, plugin_id: PluginId) -> Option<Arc<Plugin>> {
        let index = self.plugins.iter().position(|p| p.id == plugin_id)?;
        Some(self.plugins.remove(index))
    }

    pub fn plugin_connect(&mut self, plugin: Plugin) {
        info!("[RPC] {} connected", plugin);
        self.plugins.push(Arc::new(plugin));
    }

    pub fn plugin_disconnect(&mut self, plugin_id: PluginId, reason: Result<(), ReadError>) {
        if let Err(err) = &reason {
            warn!("[RPC] plugin <{}> disconnected: {}", plugin_id, err);
        }
        if self.take(plugin_id).is_some() {
            info!("[RPC] plugin <{}> removed", plugin_id);
        }
    }
}

/// Handle given to each plugin host thread. Does not keep the manager alive.
#[derive(Clone)]
pub struct WeakPluginState(Weak<Mutex<PluginState>>);

impl WeakPluginState {
    pub fn upgrade(&self) -> Option<Arc<Mutex<PluginState>>> {
        self.0.upgrade()
    }

    pub fn plugin_connect(&self, plugin: Plugin) {
        match self.upgrade() {
            Some(state) => state.lock().plugin_connect(plugin),
            None => error!("[RPC] plugin <{}> connected after the manager was dropped", plugin.id),
        }
    }

    pub fn plugin_exit(&self, plugin_id: PluginId, reason: Result<(), ReadError>) {
        if let Some(state) = self.upgrade() {
            state.lock().plugin_disconnect(plugin_id, reason);
        }
    }
}

impl Handler for WeakPluginState {
    fn handle_request(
        &mut self,
        _ctx: &RpcCtx,
        method: &str,
        params: JsonValue,
    ) -> Result<JsonValue, RemoteError> {
        debug!("[RPC] plugin request <{}>: {}", method, params);
        Ok(json!({}))
    }

    fn handle_notification(&mut self, _ctx: &RpcCtx, method: &str, params: JsonValue) {
        debug!("[RPC] plugin notification <{}>: {}", method, params);
    }
}
