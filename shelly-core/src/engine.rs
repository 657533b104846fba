// ABOUTME: Engine - owns the store, bus, shell and bots, and runs the workers.
// ABOUTME: Starts listener, speaker and worker pool as tokio tasks and stops them in order.

use crate::bot::ShellBot;
use crate::bus::{EventBus, EventName, Payload, Subscriber};
use crate::channels::{
    Inbound, InboundReceiver, InboundSender, Outbound, OutboundReceiver, OutboundSender, Reply,
    Work, WorkReceiver, WorkSender,
};
use crate::commands::Command;
use crate::context::{Check, Context};
use crate::error::{BotError, Result};
use crate::events::Event;
use crate::listener::{EventFilter, Listener};
use crate::machines::Steps;
use crate::shell::Shell;
use crate::space::Space;
use crate::speaker::Speaker;
use crate::worker::Worker;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_NAME: &str = "Shelly";
pub const UNKNOWN_VERSION: &str = "*unknown*";

/// Engine tunables
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Capacity of each bounded channel
    pub capacity: usize,
    /// How often idle workers look at `general.switch`
    pub poll_interval: Duration,
    /// Number of tasks executing queued commands
    pub workers: usize,
    /// How long `stop` waits for each task before aborting it
    pub shutdown_timeout: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            capacity: 256,
            poll_interval: Duration::from_millis(100),
            workers: 1,
            shutdown_timeout: Duration::from_secs(5),
        }
    }
}

struct Receivers {
    ingress: InboundReceiver,
    mouth: OutboundReceiver,
    work: WorkReceiver,
}

#[derive(Default)]
struct Tasks {
    listener: Option<JoinHandle<()>>,
    workers: Vec<JoinHandle<()>>,
    speaker: Option<JoinHandle<()>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct Engine {
    config: EngineConfig,
    context: Context,
    bus: EventBus,
    shell: Shell,
    space: Arc<dyn Space>,
    ingress: InboundSender,
    mouth: OutboundSender,
    work: WorkSender,
    receivers: Mutex<Option<Receivers>>,
    bots: RwLock<HashMap<String, Arc<ShellBot>>>,
    fan: RwLock<Option<InboundSender>>,
    filter: RwLock<Option<EventFilter>>,
    cancel: CancellationToken,
    tasks: Mutex<Tasks>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("space", &self.space.name())
            .field("bots", &self.enumerate_bots())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Engine with default tunables and the built-in commands loaded
    pub fn new(context: Context, space: Arc<dyn Space>) -> Self {
        Self::with_config(context, space, EngineConfig::default())
    }

    pub fn with_config(context: Context, space: Arc<dyn Space>, config: EngineConfig) -> Self {
        let capacity = config.capacity.max(1);
        let (ingress, ingress_rx) = tokio::sync::mpsc::channel(capacity);
        let (mouth, mouth_rx) = tokio::sync::mpsc::channel(capacity);
        let (work, work_rx) = tokio::sync::mpsc::channel(capacity);

        let shell = Shell::new(context.clone()).with_inbox(work.clone());
        shell.load_default_commands();

        Self {
            config,
            context,
            bus: EventBus::new(),
            shell,
            space,
            ingress,
            mouth,
            work,
            receivers: Mutex::new(Some(Receivers {
                ingress: ingress_rx,
                mouth: mouth_rx,
                work: work_rx,
            })),
            bots: RwLock::new(HashMap::new()),
            fan: RwLock::new(None),
            filter: RwLock::new(None),
            cancel: CancellationToken::new(),
            tasks: Mutex::new(Tasks::default()),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn shell(&self) -> &Shell {
        &self.shell
    }

    pub fn space(&self) -> &Arc<dyn Space> {
        &self.space
    }

    /// Sender feeding the listener
    pub fn ingress(&self) -> InboundSender {
        self.ingress.clone()
    }

    /// Sender feeding the speaker
    pub fn mouth(&self) -> OutboundSender {
        self.mouth.clone()
    }

    /// Merge settings into the store and fill in defaults
    pub fn configure(&self, settings: &Value) -> Result<()> {
        self.context.apply(settings)?;
        self.context
            .check("bot.name", Check::default_value(DEFAULT_NAME))?;
        if self.context.has("bot.on_enter") {
            self.context.check("bot.on_enter", Check::new().filter())?;
        }
        if self.context.has("bot.on_exit") {
            self.context.check("bot.on_exit", Check::new().filter())?;
        }
        // Reject a broken process definition now rather than on the first bond
        Steps::from_context(&self.context)?;
        tracing::debug!("Engine configured");
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<Value> {
        self.context.get(path)
    }

    pub fn get_or(&self, path: &str, default: impl Into<Value>) -> Value {
        self.context.get_or(path, default)
    }

    pub fn set(&self, path: &str, value: impl Into<Value>) -> Result<()> {
        self.context.set(path, value)
    }

    pub fn name(&self) -> String {
        self.context
            .get_str("bot.name")
            .unwrap_or_else(|| DEFAULT_NAME.to_string())
    }

    pub fn version(&self) -> String {
        self.context
            .get_str("bot.version")
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string())
    }

    pub fn is_running(&self) -> bool {
        self.context.get_str("general.switch").as_deref() == Some("on")
    }

    pub fn subscribe(&self, event: EventName, subscriber: Arc<dyn Subscriber>) -> Result<()> {
        self.bus.subscribe(event, subscriber)
    }

    pub fn dispatch(&self, event: &EventName, payload: &Payload) -> Result<usize> {
        self.bus.dispatch(event, payload)
    }

    pub fn load_commands(&self, commands: impl IntoIterator<Item = Arc<dyn Command>>) {
        self.shell.load_commands(commands);
    }

    /// Filter applied by listeners started after this call
    pub fn set_filter<F>(&self, filter: F)
    where
        F: Fn(Event) -> Result<Event> + Send + Sync + 'static,
    {
        *self
            .filter
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(Arc::new(filter));
    }

    pub fn filter(&self) -> Option<EventFilter> {
        self.filter
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Relay ordinary, non-command messages to `sink`
    pub fn enable_fan(&self, sink: InboundSender) -> Result<()> {
        *self
            .fan
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(sink);
        self.context
            .set("fan.stamp", chrono::Utc::now().to_rfc3339())
    }

    pub fn fan_sink(&self) -> Option<InboundSender> {
        self.fan
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn lookup_bot(&self, room_id: &str) -> Option<Arc<ShellBot>> {
        self.bots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(room_id)
            .cloned()
    }

    /// Bot of `room_id`, built on first use
    pub async fn get_bot(&self, room_id: &str) -> Result<Arc<ShellBot>> {
        match self.lookup_bot(room_id) {
            Some(bot) => Ok(bot),
            None => self.build_bot(room_id).await,
        }
    }

    /// Build and register the bot of `room_id`, then dispatch `bond`.
    ///
    /// A room that already has a bot keeps it.
    pub async fn build_bot(&self, room_id: &str) -> Result<Arc<ShellBot>> {
        let mut bot = ShellBot::new(
            room_id,
            self.context.clone(),
            self.mouth.clone(),
            Arc::clone(&self.space),
        );
        if let Some(machine) = Steps::from_context(&self.context)? {
            bot = bot.with_machine(machine);
        }
        let bot = Arc::new(bot);

        {
            let mut bots = self
                .bots
                .write()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            if let Some(existing) = bots.get(room_id) {
                return Ok(Arc::clone(existing));
            }
            bots.insert(room_id.to_string(), Arc::clone(&bot));
        }

        tracing::info!(room_id = %room_id, "Bot bonded to room");
        self.bus
            .dispatch(&EventName::Bond, &Payload::Bot(room_id.to_string()))?;
        if let Some(machine) = bot.machine() {
            machine.start(&bot).await?;
        }
        Ok(bot)
    }

    /// Forget the bot of `room_id` and dispatch `dispose`
    pub fn dispose_bot(&self, room_id: &str) -> Result<()> {
        let removed = self
            .bots
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(room_id);

        if removed.is_some() {
            tracing::info!(room_id = %room_id, "Bot disposed");
            self.bus
                .dispatch(&EventName::Dispose, &Payload::Bot(room_id.to_string()))?;
        }
        Ok(())
    }

    /// Rooms that currently have a bot, sorted
    pub fn enumerate_bots(&self) -> Vec<String> {
        let mut rooms: Vec<String> = self
            .bots
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .cloned()
            .collect();
        rooms.sort();
        rooms
    }

    /// Register `<url><server.hook>` with the space when `server.binding` is set
    ///
    /// `url` defaults to `server.url`. Returns the registered address.
    pub async fn hook(&self, url: Option<&str>) -> anyhow::Result<Option<String>> {
        if !self.context.has("server.binding") {
            tracing::debug!("No server binding, skipping webhook registration");
            return Ok(None);
        }

        let base = match url {
            Some(url) => url.to_string(),
            None => self
                .context
                .get_str("server.url")
                .ok_or(BotError::MissingKey("server.url".to_string()))?,
        };
        let hook = self
            .context
            .get_str("server.hook")
            .unwrap_or_else(|| "/hook".to_string());
        let address = format!("{}{}", base.trim_end_matches('/'), hook);

        tracing::info!(address = %address, "Registering webhook");
        self.space.register(&address).await?;
        Ok(Some(address))
    }

    /// Spawn speaker, worker pool and listener, then dispatch `start`
    pub fn start(self: &Arc<Self>) -> Result<()> {
        let Some(receivers) = lock(&self.receivers).take() else {
            tracing::warn!("Engine has already been started");
            return Ok(());
        };

        self.context.set("general.switch", "on")?;
        let mut tasks = Tasks::default();

        let speaker = Speaker::new(
            self.context.clone(),
            Arc::clone(&self.space),
            self.config.poll_interval,
        );
        let cancel = self.cancel.clone();
        tasks.speaker = Some(tokio::spawn(async move {
            speaker.run(receivers.mouth, cancel).await
        }));

        let work = Arc::new(tokio::sync::Mutex::new(receivers.work));
        for index in 0..self.config.workers.max(1) {
            let worker = Worker::new(Arc::clone(self), index);
            let work = Arc::clone(&work);
            let cancel = self.cancel.clone();
            tasks
                .workers
                .push(tokio::spawn(async move { worker.run(work, cancel).await }));
        }

        let listener = Listener::new(Arc::clone(self));
        let cancel = self.cancel.clone();
        let ingress = receivers.ingress;
        tasks.listener = Some(tokio::spawn(async move {
            listener.run(ingress, cancel).await
        }));

        *lock(&self.tasks) = tasks;

        tracing::info!(workers = self.config.workers.max(1), "Engine started");
        self.bus.dispatch(&EventName::Start, &Payload::None)?;
        Ok(())
    }

    /// Stop the workers in pipeline order so queued items are delivered.
    ///
    /// Listener first, then the worker pool, then the speaker once every
    /// goodbye has been queued. When the switch is already off the speaker
    /// has left its loop, so goodbyes go straight to the space.
    pub async fn stop(&self) -> Result<()> {
        let mut tasks = std::mem::take(&mut *lock(&self.tasks));

        if let Some(handle) = tasks.listener {
            if self.ingress.send(Inbound::Sentinel).await.is_err() {
                tracing::debug!("Listener channel already closed");
            }
            self.join("listener", handle).await;
        }

        let workers = tasks.workers.len();
        for _ in 0..workers {
            if self.work.send(Work::Sentinel).await.is_err() {
                tracing::debug!("Work channel already closed");
            }
        }
        for handle in tasks.workers {
            self.join("worker", handle).await;
        }

        let speaking = self.is_running();
        if !speaking {
            if let Some(handle) = tasks.speaker.take() {
                self.join("speaker", handle).await;
            }
        }
        if let Some(goodbye) = self.context.get_str("bot.on_exit") {
            self.say_goodbye(&goodbye, speaking).await;
        }

        if let Some(handle) = tasks.speaker {
            if self.mouth.send(Outbound::Sentinel).await.is_err() {
                tracing::debug!("Speaker channel already closed");
            }
            self.join("speaker", handle).await;
        }

        self.cancel.cancel();
        self.context.set("general.switch", "off")?;

        tracing::info!("Engine stopped");
        self.bus.dispatch(&EventName::Stop, &Payload::None)?;
        Ok(())
    }

    /// Say `goodbye` in every room, through the speaker when it still runs
    async fn say_goodbye(&self, goodbye: &str, queued: bool) {
        if goodbye.is_empty() {
            return;
        }
        let direct = Speaker::new(
            self.context.clone(),
            Arc::clone(&self.space),
            self.config.poll_interval,
        );

        for room_id in self.enumerate_bots() {
            let Some(bot) = self.lookup_bot(&room_id) else {
                continue;
            };
            if queued {
                match bot.say(goodbye).await {
                    Ok(()) => continue,
                    Err(e) => {
                        tracing::debug!(room_id = %room_id, error = %e, "Speaker gone, saying goodbye directly")
                    }
                }
            }
            if let Err(e) = direct.process(&Reply::text(goodbye).to_room(room_id.as_str())).await {
                crate::metrics::speaker_error();
                tracing::warn!(room_id = %room_id, error = %e, "Failed to say goodbye");
            }
        }
    }

    async fn join(&self, name: &str, mut handle: JoinHandle<()>) {
        match tokio::time::timeout(self.config.shutdown_timeout, &mut handle).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(task = %name, error = %e, "Task ended abnormally"),
            Err(_) => {
                tracing::warn!(task = %name, "Task did not stop in time, aborting");
                handle.abort();
            }
        }
    }

    async fn switched_off(&self) {
        while self.is_running() {
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Start, feed everything the space delivers to the listener, then stop.
    ///
    /// Pumping also ends when `general.switch` is turned off.
    pub async fn run(self: &Arc<Self>) -> Result<()> {
        self.start()?;

        loop {
            let received = tokio::select! {
                received = self.space.receive() => received,
                _ = self.switched_off() => break,
            };
            match received {
                Ok(Some(Inbound::Sentinel)) | Ok(None) => break,
                Ok(Some(item)) => {
                    if self.ingress.send(item).await.is_err() {
                        tracing::warn!("Listener channel closed while pumping");
                        break;
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to receive from space");
                    break;
                }
            }
        }

        self.stop().await
    }
}
