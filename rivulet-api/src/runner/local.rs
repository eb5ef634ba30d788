use super::*;

// ── Worker protocol ───────────────────────────────────────────────────────────

enum Command {
    Process(IncomingMessageEnvelope),
    Tick,
    Flush,
}

#[derive(Default)]
struct TaskOutput {
    sent: Vec<OutgoingMessageEnvelope>,
    requests: CoordinatorRequests,
}

/// Reply to every command, including the implicit `init` on start.
struct Ack {
    task: usize,
    result: Result<TaskOutput>,
}

struct Worker {
    commands: Sender<Command>,
    handle: JoinHandle<Result<()>>,
}

fn spawn_worker(
    index: usize,
    mut task: Box<dyn StreamTask>,
    context: TaskContext,
    acks: Sender<Ack>,
) -> Result<Worker> {
    let (commands, inbox): (Sender<Command>, Receiver<Command>) = unbounded();
    let handle = thread::Builder::new()
        .name(context.task_name().to_string())
        .spawn(move || -> Result<()> {
            let init = task.init(&context).map(|()| TaskOutput::default());
            let failed = init.is_err();
            if acks.send(Ack { task: index, result: init }).is_err() || failed {
                return Ok(());
            }
            for command in inbox {
                let mut collector = BufferedCollector::new();
                let mut coordinator = CoordinatorRequests::new();
                let result = match command {
                    Command::Process(envelope) => {
                        task.process(envelope, &mut collector, &mut coordinator)
                    }
                    Command::Tick => task.window(&mut collector, &mut coordinator),
                    Command::Flush => task.flush(&mut collector, &mut coordinator),
                };
                let result = result.map(|()| TaskOutput {
                    sent: collector.drain(),
                    requests: coordinator.take(),
                });
                if acks.send(Ack { task: index, result }).is_err() {
                    break;
                }
            }
            task.close()
                .with_context(|| format!("closing {}", context.task_name()))
        })
        .with_context(|| format!("spawning thread for task-{index}"))?;
    Ok(Worker { commands, handle })
}

// ── Input cursors ─────────────────────────────────────────────────────────────

struct Cursor {
    stream: StreamId,
    partition: u32,
    offset: u64,
}

/// The input partitions owned by one task, polled round-robin.
#[derive(Default)]
struct Assignment {
    cursors: Vec<Cursor>,
    next: usize,
}

impl Assignment {
    fn poll(&mut self, system: &InMemorySystem) -> Option<(StreamPartition, u64, RawMessage)> {
        let len = self.cursors.len();
        for i in 0..len {
            let idx = (self.next + i) % len;
            let cursor = &mut self.cursors[idx];
            if let Some(raw) = system.read(&cursor.stream, cursor.partition, cursor.offset) {
                let offset = cursor.offset;
                cursor.offset += 1;
                self.next = (idx + 1) % len;
                let partition = StreamPartition::new(cursor.stream.clone(), cursor.partition);
                return Some((partition, offset, raw));
            }
        }
        None
    }

    fn has_unread(&self, system: &InMemorySystem) -> bool {
        self.cursors
            .iter()
            .any(|c| system.len(&c.stream, c.partition) > c.offset)
    }
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

/// Status of the current run plus its kill flag, shared with callers on other threads.
#[derive(Debug, Default)]
struct Lifecycle {
    status: Mutex<ApplicationStatus>,
    finished: Condvar,
    kill: AtomicBool,
}

impl Lifecycle {
    fn start(&self, app: &str) -> Result<()> {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == ApplicationStatus::Running {
            bail!("application {app} is already running");
        }
        self.kill.store(false, Ordering::Release);
        *status = ApplicationStatus::Running;
        Ok(())
    }

    fn finish(&self, result: &Result<RunSummary>) {
        let mut status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        *status = match result {
            Ok(_) => ApplicationStatus::SuccessfulFinish,
            Err(err) => ApplicationStatus::UnsuccessfulFinish(format!("{err:#}")),
        };
        self.finished.notify_all();
    }

    fn kill(&self) {
        let status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        if *status == ApplicationStatus::Running {
            tracing::info!("kill requested");
            self.kill.store(true, Ordering::Release);
        } else {
            tracing::debug!("ignoring kill, application is {:?}", *status);
        }
    }

    fn status(&self) -> ApplicationStatus {
        self.status
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn wait(&self, timeout: Option<Duration>) -> ApplicationStatus {
        let status = self.status.lock().unwrap_or_else(PoisonError::into_inner);
        let running = |status: &mut ApplicationStatus| *status == ApplicationStatus::Running;
        let status = match timeout {
            Some(timeout) => {
                self.finished
                    .wait_timeout_while(status, timeout, running)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => self
                .finished
                .wait_while(status, running)
                .unwrap_or_else(PoisonError::into_inner),
        };
        status.clone()
    }
}

// ── Runner ────────────────────────────────────────────────────────────────────

/// Runs an application in this process against an [`InMemorySystem`].
///
/// `job.partitions` tasks run on their own threads. Task `i` owns partition `p` of
/// every input stream with `p % tasks == i`, so all messages of one key meet in one
/// task. Inputs are treated as bounded: once every partition is drained, timers run
/// and open panes are flushed, and the run ends when that produces nothing new.
///
/// With `task.window.ms` set, every task also gets a `window` call at that interval
/// while messages are flowing.
///
/// One run at a time. Share the runner behind an [`Arc`] to kill or watch a run from
/// another thread.
pub struct LocalApplicationRunner {
    config: Config,
    system: InMemorySystem,
    tasks: TaskFactoryRegistry,
    clock: Arc<dyn Clock>,
    lifecycle: Lifecycle,
}

impl LocalApplicationRunner {
    pub fn new(config: Config, system: InMemorySystem) -> Self {
        Self {
            config,
            system,
            tasks: TaskFactoryRegistry::default(),
            clock: Arc::new(SystemClock),
            lifecycle: Lifecycle::default(),
        }
    }

    pub fn with_task_factories(mut self, tasks: TaskFactoryRegistry) -> Self {
        self.tasks = tasks;
        self
    }

    /// Clock handed to every task.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn system(&self) -> &InMemorySystem {
        &self.system
    }

    fn task_count(&self) -> Result<usize> {
        match self.config.get_u32(JOB_PARTITIONS)?.unwrap_or(1) {
            0 => bail!("{JOB_PARTITIONS} must be positive"),
            n => Ok(n as usize),
        }
    }

    /// Create missing streams and collect the serde of every input and output.
    fn prepare_streams(
        &self,
        specs: &OperatorSpecGraph,
    ) -> Result<(HashMap<StreamId, KvSerde>, HashMap<StreamId, KvSerde>)> {
        let mut inputs = HashMap::new();
        let mut outputs = HashMap::new();
        for input in specs.inputs() {
            let serde = input
                .serde
                .clone()
                .ok_or_else(|| anyhow!("input stream {} has no serde", input.stream))?;
            inputs.insert(input.stream.clone(), serde);
        }
        for output in specs.outputs() {
            let serde = output
                .serde
                .clone()
                .ok_or_else(|| anyhow!("output stream {} has no serde", output.stream))?;
            outputs.insert(output.stream.clone(), serde);
        }
        for stream in inputs.keys().chain(outputs.keys()) {
            if self.system.partition_count(stream).is_none() {
                let partitions = self.config.stream_partitions(stream)?;
                tracing::debug!("creating stream {} with {} partitions", stream, partitions);
                self.system.create_stream(stream.clone(), partitions);
            }
        }
        Ok((inputs, outputs))
    }

    fn assignments(&self, specs: &OperatorSpecGraph, tasks: usize) -> Vec<Assignment> {
        let mut assignments: Vec<Assignment> = (0..tasks).map(|_| Assignment::default()).collect();
        for input in specs.inputs() {
            let partitions = self.system.partition_count(&input.stream).unwrap_or(0);
            for partition in 0..partitions {
                assignments[partition as usize % tasks].cursors.push(Cursor {
                    stream: input.stream.clone(),
                    partition,
                    offset: 0,
                });
            }
        }
        assignments
    }

    fn execute(&self, app: &StreamApplication) -> Result<RunSummary> {
        let specs = app.build()?;
        let tasks = self.task_count()?;
        let (inputs, outputs) = self.prepare_streams(&specs)?;
        let mut assignments = self.assignments(&specs, tasks);
        let tick_every = self
            .config
            .get_duration_ms(TASK_WINDOW_MS)?
            .filter(|d| !d.is_zero());

        let (ack_tx, acks) = unbounded();
        let mut workers = Vec::with_capacity(tasks);
        for (index, assignment) in assignments.iter().enumerate() {
            let task = self.tasks.create(&specs, &self.config)?;
            let partitions = assignment
                .cursors
                .iter()
                .map(|c| StreamPartition::new(c.stream.clone(), c.partition))
                .collect();
            let context = TaskContext::new(format!("task-{index}"), self.config.clone())
                .with_partitions(partitions)
                .with_clock(Arc::clone(&self.clock));
            workers.push(spawn_worker(index, task, context, ack_tx.clone())?);
        }
        drop(ack_tx);
        tracing::info!(
            "running application {} with {} tasks",
            app.name(),
            tasks
        );

        let mut driver = Driver {
            system: &self.system,
            inputs: &inputs,
            outputs: &outputs,
            acks: &acks,
            workers: &workers,
            kill: &self.lifecycle.kill,
            summary: RunSummary::default(),
        };
        let result = driver
            .await_acks(tasks)
            .and_then(|()| driver.drive(&mut assignments, tick_every));
        let summary = driver.summary;

        let mut closed: Result<()> = Ok(());
        for (index, worker) in workers.into_iter().enumerate() {
            drop(worker.commands);
            let joined = worker
                .handle
                .join()
                .map_err(|_| anyhow!("task-{index} panicked"))
                .and_then(|r| r);
            if let Err(err) = joined {
                tracing::warn!("task-{} did not shut down cleanly: {:#}", index, err);
                if closed.is_ok() {
                    closed = Err(err);
                }
            }
        }
        result?;
        closed?;

        tracing::info!(
            "application {} {}: {} processed, {} emitted, {} commits",
            app.name(),
            if summary.killed { "killed" } else { "finished" },
            summary.processed,
            summary.emitted,
            summary.commits
        );
        Ok(summary)
    }
}

impl ApplicationRunner for LocalApplicationRunner {
    fn run(&self, app: &StreamApplication) -> Result<RunSummary> {
        self.lifecycle.start(&app.name())?;
        let result = self.execute(app);
        if let Err(err) = &result {
            tracing::warn!("application {} failed: {:#}", app.name(), err);
        }
        self.lifecycle.finish(&result);
        result
    }

    fn kill(&self) {
        self.lifecycle.kill();
    }

    fn status(&self) -> ApplicationStatus {
        self.lifecycle.status()
    }

    fn wait_for_finish(&self, timeout: Option<Duration>) -> ApplicationStatus {
        self.lifecycle.wait(timeout)
    }
}

// ── Driver loop ───────────────────────────────────────────────────────────────

struct Driver<'a> {
    system: &'a InMemorySystem,
    inputs: &'a HashMap<StreamId, KvSerde>,
    outputs: &'a HashMap<StreamId, KvSerde>,
    acks: &'a Receiver<Ack>,
    workers: &'a [Worker],
    kill: &'a AtomicBool,
    summary: RunSummary,
}

impl Driver<'_> {
    fn drive(&mut self, assignments: &mut [Assignment], tick_every: Option<Duration>) -> Result<()> {
        let mut last_tick = Instant::now();
        while !self.summary.shutdown_requested {
            if self.kill.load(Ordering::Acquire) {
                self.summary.killed = true;
                break;
            }
            let mut dispatched = 0;
            for (task, assignment) in assignments.iter_mut().enumerate() {
                if let Some((partition, offset, raw)) = assignment.poll(self.system) {
                    let envelope = self.decode(partition, offset, raw)?;
                    self.send(task, Command::Process(envelope))?;
                    dispatched += 1;
                }
            }

            if dispatched > 0 {
                self.summary.processed += dispatched as u64;
                self.await_acks(dispatched)?;
                if tick_every.is_some_and(|every| last_tick.elapsed() >= every) {
                    self.tick()?;
                    last_tick = Instant::now();
                }
                continue;
            }

            // Inputs drained: fire due timers, then flush what is left.
            self.tick()?;
            last_tick = Instant::now();
            if assignments.iter().any(|a| a.has_unread(self.system)) {
                continue;
            }
            self.broadcast(|| Command::Flush)?;
            if !assignments.iter().any(|a| a.has_unread(self.system)) {
                break;
            }
        }
        Ok(())
    }

    fn decode(&self, partition: StreamPartition, offset: u64, raw: RawMessage) -> Result<IncomingMessageEnvelope> {
        let serde = self
            .inputs
            .get(&partition.stream)
            .ok_or_else(|| anyhow!("no serde for input stream {}", partition.stream))?;
        let key = serde
            .decode_key(&raw.key)
            .with_context(|| format!("decoding key at {partition} offset {offset}"))?;
        let message = serde
            .decode_message(&raw.message)
            .with_context(|| format!("decoding message at {partition} offset {offset}"))?;
        let envelope = IncomingMessageEnvelope::new(partition, offset.to_string(), key, message);
        Ok(match raw.timestamp {
            Some(ts) => envelope.with_timestamp(ts),
            None => envelope,
        })
    }

    fn send(&self, task: usize, command: Command) -> Result<()> {
        self.workers[task]
            .commands
            .send(command)
            .map_err(|_| anyhow!("task-{task} stopped unexpectedly"))
    }

    fn broadcast(&mut self, command: fn() -> Command) -> Result<()> {
        for task in 0..self.workers.len() {
            self.send(task, command())?;
        }
        self.await_acks(self.workers.len())
    }

    fn tick(&mut self) -> Result<()> {
        self.broadcast(|| Command::Tick)?;
        self.summary.ticks += self.workers.len() as u64;
        Ok(())
    }

    /// Wait for `expected` acks and apply their output in task order.
    fn await_acks(&mut self, expected: usize) -> Result<()> {
        let mut outputs: Vec<(usize, TaskOutput)> = Vec::with_capacity(expected);
        for _ in 0..expected {
            let Ack { task, result } = self
                .acks
                .recv()
                .map_err(|_| anyhow!("all task threads stopped"))?;
            let output = result.with_context(|| format!("task-{task} failed"))?;
            outputs.push((task, output));
        }
        outputs.sort_by_key(|(task, _)| *task);
        for (task, output) in outputs {
            for envelope in output.sent {
                self.route(envelope)?;
            }
            if output.requests.commit.is_some() {
                self.summary.commits += 1;
            }
            if let Some(scope) = output.requests.shutdown {
                tracing::info!("task-{} requested shutdown ({:?})", task, scope);
                self.summary.shutdown_requested = true;
            }
        }
        Ok(())
    }

    fn route(&mut self, envelope: OutgoingMessageEnvelope) -> Result<()> {
        let stream = &envelope.stream;
        let serde = self
            .outputs
            .get(stream)
            .ok_or_else(|| anyhow!("message sent to unregistered stream {stream}"))?;
        let key = serde
            .encode_key(&envelope.key)
            .with_context(|| format!("encoding key for {stream}"))?;
        let message = serde
            .encode_message(&envelope.message)
            .with_context(|| format!("encoding message for {stream}"))?;
        let count = self
            .system
            .partition_count(stream)
            .ok_or_else(|| anyhow!("stream {stream} does not exist"))?;
        let partition = match envelope.partition {
            Some(p) => p % count,
            None => HashPartitioner.partition(&key[..], count),
        };
        self.system.append(
            stream,
            partition,
            RawMessage {
                key,
                message,
                timestamp: envelope.timestamp,
            },
        )?;
        self.summary.emitted += 1;
        Ok(())
    }
}
