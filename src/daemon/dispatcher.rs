//! Update dispatcher
//!
//! The dispatcher owns the RAW context of one interface behind an async mutex
//! and runs regeneration passes on a single worker task. Triggers only record
//! pending work and wake the worker; wake-ups that arrive while a pass is
//! running collapse into one follow-up pass.

use crate::command::RawCommand;
use crate::context::{RawContext, RawStats};
use crate::{ocs, RawError, Result};

use std::sync::Arc;
use tokio::sync::{oneshot, Mutex, Notify, RwLock};
use tokio::task::JoinHandle;

/// Receives every regenerated RPS element payload
#[async_trait::async_trait]
pub trait IeObserver: Send + Sync {
    /// Called after each successful pass with the current payload (possibly empty)
    async fn on_rps_ie(&self, payload: &[u8]) -> Result<()>;

    /// Called when a pass fails; the payload has been cleared
    async fn on_pass_failed(&self, _error: &RawError) {}

    /// Get observer name
    fn name(&self) -> &str;
}

type ObserverList = Arc<RwLock<Vec<Arc<dyn IeObserver>>>>;

/// Serialized RAW update worker for one interface
pub struct RawDispatcher {
    /// RAW context shared with the worker
    context: Arc<Mutex<RawContext>>,
    /// Wakes the worker
    notify: Arc<Notify>,
    /// Payload observers
    observers: ObserverList,
    /// Shutdown sender
    shutdown_tx: Option<oneshot::Sender<()>>,
    /// Worker task
    worker: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for RawDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RawDispatcher")
            .field("running", &self.worker.is_some())
            .field("observers", &"[observers]")
            .finish()
    }
}

impl RawDispatcher {
    /// Take ownership of `context` and start the worker task.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(context: RawContext) -> Self {
        Self::start_with_observers(context, Vec::new())
    }

    /// Like [`RawDispatcher::start`], with observers registered before the
    /// first pass runs.
    pub fn start_with_observers(context: RawContext, observers: Vec<Arc<dyn IeObserver>>) -> Self {
        let context = Arc::new(Mutex::new(context));
        let notify = Arc::new(Notify::new());
        let observers: ObserverList = Arc::new(RwLock::new(observers));
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let worker = tokio::spawn(Self::run_worker(
            Arc::clone(&context),
            Arc::clone(&notify),
            Arc::clone(&observers),
            shutdown_rx,
        ));

        // Pick up anything requested before the worker existed
        notify.notify_one();

        log::info!("RAW dispatcher started");
        Self {
            context,
            notify,
            observers,
            shutdown_tx: Some(shutdown_tx),
            worker: Some(worker),
        }
    }

    async fn run_worker(
        context: Arc<Mutex<RawContext>>,
        notify: Arc<Notify>,
        observers: ObserverList,
        mut shutdown_rx: oneshot::Receiver<()>,
    ) {
        loop {
            tokio::select! {
                _ = &mut shutdown_rx => {
                    log::debug!("RAW worker received shutdown signal");
                    break;
                }
                _ = notify.notified() => {
                    Self::run_pass(&context, &observers).await;
                }
            }
        }
        log::debug!("RAW worker terminated");
    }

    async fn run_pass(context: &Mutex<RawContext>, observers: &ObserverList) {
        let result = {
            let mut ctx = context.lock().await;
            ctx.regenerate().map(|_| ctx.rps_ie().to_vec())
        };

        let observers = observers.read().await;
        match result {
            Ok(payload) => {
                log::trace!("RPS IE regenerated: {} bytes", payload.len());
                for observer in observers.iter() {
                    if let Err(e) = observer.on_rps_ie(&payload).await {
                        log::error!("Observer {} failed: {}", observer.name(), e);
                    }
                }
            }
            Err(e) => {
                log::error!("RAW update failed: {}", e);
                for observer in observers.iter() {
                    observer.on_pass_failed(&e).await;
                }
            }
        }
    }

    fn wake(&self, needed: bool) -> bool {
        if needed {
            self.notify.notify_one();
        }
        needed
    }

    /// Register a payload observer
    pub async fn add_observer(&self, observer: Arc<dyn IeObserver>) {
        log::debug!("Adding RPS IE observer {}", observer.name());
        self.observers.write().await.push(observer);
    }

    /// Remove an observer by name
    pub async fn remove_observer(&self, name: &str) {
        self.observers.write().await.retain(|o| o.name() != name);
    }

    /// Apply a configuration command
    pub async fn process_command(&self, cmd: &RawCommand) -> Result<()> {
        let result = self.context.lock().await.process_command(cmd);
        self.wake(true);
        result
    }

    /// Parse and apply a configuration command in wire format
    pub async fn process_command_bytes(&self, data: &[u8]) -> Result<()> {
        let cmd = RawCommand::from_bytes(data)?;
        self.process_command(&cmd).await
    }

    // The membership and trigger methods below return true when a pass was
    // scheduled.

    pub async fn station_associated(&self, aid: u16) -> Result<bool> {
        let needed = self.context.lock().await.station_associated(aid)?;
        Ok(self.wake(needed))
    }

    pub async fn station_disassociated(&self, aid: u16) -> Result<bool> {
        let needed = self.context.lock().await.station_disassociated(aid)?;
        Ok(self.wake(needed))
    }

    /// Signal that a beacon was transmitted
    pub async fn beacon_sent(&self) -> bool {
        let needed = self.context.lock().await.notify_beacon_sent();
        self.wake(needed)
    }

    /// Request a regeneration pass
    pub async fn trigger_update(&self, refresh_aids: bool) -> bool {
        let needed = self.context.lock().await.trigger_update(refresh_aids);
        self.wake(needed)
    }

    /// Protect an off-channel scan for `aid`
    pub async fn install_ocs(&self, aid: u16) -> Result<bool> {
        let needed = ocs::install(&mut *self.context.lock().await, aid)?;
        Ok(self.wake(needed))
    }

    /// End the off-channel scan protection
    pub async fn remove_ocs(&self) -> bool {
        let needed = ocs::remove(&mut *self.context.lock().await);
        self.wake(needed)
    }

    /// Copy of the current RPS element payload
    pub async fn rps_ie(&self) -> Vec<u8> {
        self.context.lock().await.rps_ie().to_vec()
    }

    pub async fn is_enabled(&self) -> bool {
        self.context.lock().await.is_enabled()
    }

    pub async fn stats(&self) -> RawStats {
        self.context.lock().await.stats()
    }

    /// Shared handle to the context
    pub fn context(&self) -> Arc<Mutex<RawContext>> {
        Arc::clone(&self.context)
    }

    /// Stop the worker, wait for an in-progress pass to finish and tear the
    /// context down.
    pub async fn shutdown(mut self) -> Result<()> {
        log::info!("Stopping RAW dispatcher...");
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(worker) = self.worker.take() {
            worker
                .await
                .map_err(|e| RawError::InternalInconsistency(format!("RAW worker failed: {}", e)))?;
        }
        self.context.lock().await.teardown();
        log::info!("RAW dispatcher stopped");
        Ok(())
    }
}

impl Drop for RawDispatcher {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{CommandFlags, CommandTlv};
    use crate::context::{InterfaceKind, RawOptions};
    use crate::rps::RpsIe;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::mpsc;

    struct ChannelObserver {
        tx: mpsc::UnboundedSender<Vec<u8>>,
    }

    #[async_trait::async_trait]
    impl IeObserver for ChannelObserver {
        async fn on_rps_ie(&self, payload: &[u8]) -> Result<()> {
            let _ = self.tx.send(payload.to_vec());
            Ok(())
        }

        fn name(&self) -> &str {
            "channel"
        }
    }

    struct CountingObserver {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait::async_trait]
    impl IeObserver for CountingObserver {
        async fn on_rps_ie(&self, _payload: &[u8]) -> Result<()> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            Ok(())
        }

        fn name(&self) -> &str {
            "counting"
        }
    }

    fn dispatcher() -> RawDispatcher {
        let options = RawOptions {
            enabled: true,
            ..RawOptions::default()
        };
        RawDispatcher::start(RawContext::new(InterfaceKind::AccessPoint, options).unwrap())
    }

    async fn next_payload(rx: &mut mpsc::UnboundedReceiver<Vec<u8>>) -> Vec<u8> {
        tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .unwrap()
            .unwrap()
    }

    #[tokio::test]
    async fn test_command_regenerates() {
        let dispatcher = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.add_observer(Arc::new(ChannelObserver { tx })).await;

        let cmd = RawCommand::new(5, CommandFlags::UPDATE | CommandFlags::ENABLE)
            .with_tlv(CommandTlv::SlotDef {
                raw_duration_us: 2000,
                num_slots: 2,
                cross_slot_boundary: false,
            })
            .with_tlv(CommandTlv::Group {
                start_aid: 10,
                end_aid: 50,
            });
        dispatcher.process_command_bytes(&cmd.to_bytes()).await.unwrap();

        let payload = loop {
            let payload = next_payload(&mut rx).await;
            if !payload.is_empty() {
                break payload;
            }
        };
        let ie = RpsIe::parse(&payload).unwrap();
        assert_eq!(ie.assignments[0].group, Some((10, 50)));
        assert_eq!(dispatcher.rps_ie().await, payload);

        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_bad_command_bytes() {
        let dispatcher = dispatcher();
        let result = dispatcher.process_command_bytes(&[1, 0, 4, 1, 0, 42]).await;
        assert!(matches!(result, Err(RawError::InvalidArgument(_))));
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_triggers_coalesce() {
        let dispatcher = dispatcher();
        let calls = Arc::new(AtomicUsize::new(0));
        dispatcher
            .add_observer(Arc::new(CountingObserver {
                calls: Arc::clone(&calls),
            }))
            .await;

        {
            // Hold the context so the worker cannot complete a pass
            let _guard = dispatcher.context.lock().await;
            for _ in 0..10 {
                dispatcher.notify.notify_one();
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        // At most the initial pass plus one coalesced follow-up
        assert!(calls.load(Ordering::Relaxed) <= 2);

        dispatcher.remove_observer("counting").await;
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_ocs_and_membership() {
        let dispatcher = dispatcher();
        let (tx, mut rx) = mpsc::unbounded_channel();
        dispatcher.add_observer(Arc::new(ChannelObserver { tx })).await;

        dispatcher.station_associated(4).await.unwrap();
        assert!(dispatcher.station_associated(0).await.is_err());
        dispatcher.install_ocs(4).await.unwrap();

        let payload = loop {
            let payload = next_payload(&mut rx).await;
            if !payload.is_empty() {
                break payload;
            }
        };
        assert_eq!(RpsIe::parse(&payload).unwrap().assignments[0].group, Some((4, 4)));

        dispatcher.remove_ocs().await;
        loop {
            if next_payload(&mut rx).await.is_empty() {
                break;
            }
        }
        assert!(dispatcher.is_enabled().await);
        assert!(dispatcher.stats().await.regenerations >= 2);
        dispatcher.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_tears_down() {
        let dispatcher = dispatcher();
        let context = dispatcher.context();
        dispatcher.trigger_update(false).await;
        dispatcher.beacon_sent().await;
        dispatcher.shutdown().await.unwrap();
        assert!(!context.lock().await.is_enabled());
    }
}
