// Restartable turn countdown running on its own thread.
//
// `Timer` calls `TimerHandler::on_time_update` once per tick with the seconds
// left, and `TimerHandler::on_times_up` when the count has reached zero. The
// expiry callback writes the duration of the next turn into its argument and
// the countdown rolls straight into it, so a started timer only ever ends by
// `stop()`.
//
// Threading: one background thread per running countdown. The thread sleeps
// in `Condvar::wait_timeout_while` on the shared `TimerState`, so `stop()`
// wakes it immediately instead of waiting out the tick. The interrupt flag is
// per instance; two timers never interfere. Callbacks run without the state
// lock held.
//
// `start()` first performs a full `stop()`, so at most one countdown thread
// exists per `Timer`. `stop()` joins the thread before returning, so state
// observed after `stop()` is final.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, info, trace};

/// Callbacks driven by a running `Timer`.
///
/// Both run on the timer thread and must not block for long; they are
/// expected to be plain message sends.
pub trait TimerHandler: Send + Sync {
    /// Called once per tick with the seconds left in the current turn.
    fn on_time_update(&self, seconds_left: u16);

    /// Called when a tick elapses with zero seconds left. Write the length of
    /// the next turn into `next_seconds`.
    fn on_times_up(&self, next_seconds: &mut u16);
}

#[derive(Debug, Default)]
struct TimerState {
    seconds_left: u16,
    running: bool,
    interrupted: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    wakeup: Condvar,
}

pub struct Timer {
    handler: Arc<dyn TimerHandler>,
    tick: Duration,
    shared: Arc<Shared>,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl Timer {
    /// A timer with a one-second tick.
    pub fn new(handler: Arc<dyn TimerHandler>) -> Self {
        Self::with_tick_interval(handler, Duration::from_secs(1))
    }

    pub fn with_tick_interval(handler: Arc<dyn TimerHandler>, tick: Duration) -> Self {
        Self {
            handler,
            tick,
            shared: Arc::new(Shared {
                state: Mutex::new(TimerState::default()),
                wakeup: Condvar::new(),
            }),
            thread: Mutex::new(None),
        }
    }

    /// Start counting down from `seconds`, replacing any running countdown.
    pub fn start(&self, seconds: u16) {
        info!("Timer is being started (seconds left: {seconds})");
        let mut worker = lock(&self.thread);
        self.stop_locked(&mut worker);

        {
            let mut state = lock(&self.shared.state);
            state.interrupted = false;
            state.running = true;
            state.seconds_left = seconds;
        }

        let handler = Arc::clone(&self.handler);
        let shared = Arc::clone(&self.shared);
        let tick = self.tick;
        let spawned = thread::Builder::new()
            .name("hob-timer".into())
            .spawn(move || countdown(handler, shared, tick, seconds));
        match spawned {
            Ok(handle) => *worker = Some(handle),
            Err(e) => {
                error!("Timer thread failed to spawn: {e}");
                lock(&self.shared.state).running = false;
            }
        }
    }

    /// Interrupt the countdown and wait for its thread to exit. No-op when
    /// nothing is running.
    pub fn stop(&self) {
        let mut worker = lock(&self.thread);
        self.stop_locked(&mut worker);
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).running
    }

    pub fn seconds_left(&self) -> u16 {
        lock(&self.shared.state).seconds_left
    }

    fn stop_locked(&self, worker: &mut Option<JoinHandle<()>>) {
        lock(&self.shared.state).interrupted = true;
        self.shared.wakeup.notify_all();

        if let Some(handle) = worker.take() {
            info!("Timer is being stopped");
            debug!("Timer thread is being joined");
            if handle.join().is_err() {
                error!("Timer thread panicked");
            }
            debug!("Timer thread has joined");
        }
        lock(&self.shared.state).running = false;
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Body of the timer thread.
fn countdown(handler: Arc<dyn TimerHandler>, shared: Arc<Shared>, tick: Duration, seconds: u16) {
    let mut seconds_left = seconds;
    trace!("Timer has started (seconds left: {seconds_left})");

    loop {
        handler.on_time_update(seconds_left);

        let state = lock(&shared.state);
        let (mut state, _) = shared
            .wakeup
            .wait_timeout_while(state, tick, |s| !s.interrupted)
            .unwrap_or_else(PoisonError::into_inner);
        if state.interrupted {
            debug!("Timer thread has been interrupted");
            break;
        }

        if seconds_left == 0 {
            drop(state);
            handler.on_times_up(&mut seconds_left);
            lock(&shared.state).seconds_left = seconds_left;
            continue;
        }
        seconds_left -= 1;
        state.seconds_left = seconds_left;
        trace!("One tick passed (seconds left: {seconds_left})");
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc::{self, Receiver, Sender};

    use super::*;

    #[derive(Debug, PartialEq)]
    enum Event {
        Update(u16),
        TimesUp,
    }

    struct Recorder {
        tx: Mutex<Sender<Event>>,
        next_turn: u16,
    }

    impl TimerHandler for Recorder {
        fn on_time_update(&self, seconds_left: u16) {
            let _ = lock(&self.tx).send(Event::Update(seconds_left));
        }

        fn on_times_up(&self, next_seconds: &mut u16) {
            *next_seconds = self.next_turn;
            let _ = lock(&self.tx).send(Event::TimesUp);
        }
    }

    fn recording_timer(tick: Duration, next_turn: u16) -> (Timer, Receiver<Event>) {
        let (tx, rx) = mpsc::channel();
        let handler = Arc::new(Recorder {
            tx: Mutex::new(tx),
            next_turn,
        });
        (Timer::with_tick_interval(handler, tick), rx)
    }

    fn next(rx: &Receiver<Event>) -> Event {
        rx.recv_timeout(Duration::from_secs(5))
            .expect("timer event did not arrive")
    }

    #[test]
    fn counts_down_then_rolls_into_next_turn() {
        let (timer, rx) = recording_timer(Duration::from_millis(10), 2);
        timer.start(3);

        let events: Vec<Event> = (0..9).map(|_| next(&rx)).collect();
        timer.stop();

        assert_eq!(
            events,
            vec![
                Event::Update(3),
                Event::Update(2),
                Event::Update(1),
                Event::Update(0),
                Event::TimesUp,
                Event::Update(2),
                Event::Update(1),
                Event::Update(0),
                Event::TimesUp,
            ]
        );
    }

    #[test]
    fn default_tick_is_one_second() {
        let (tx, rx) = mpsc::channel();
        let timer = Timer::new(Arc::new(Recorder {
            tx: Mutex::new(tx),
            next_turn: 30,
        }));
        assert_eq!(timer.tick, Duration::from_secs(1));

        timer.start(30);
        assert_eq!(next(&rx), Event::Update(30));
        // The next tick is a second away.
        assert!(rx.recv_timeout(Duration::from_millis(300)).is_err());
        timer.stop();
    }

    #[test]
    fn zero_length_turn_expires_after_one_tick() {
        let (timer, rx) = recording_timer(Duration::from_millis(10), 1);
        timer.start(0);
        assert_eq!(next(&rx), Event::Update(0));
        assert_eq!(next(&rx), Event::TimesUp);
        assert_eq!(next(&rx), Event::Update(1));
        timer.stop();
    }

    #[test]
    fn stop_interrupts_a_long_tick() {
        let (timer, rx) = recording_timer(Duration::from_secs(60), 30);
        timer.start(30);
        assert_eq!(next(&rx), Event::Update(30));
        assert!(timer.is_running());

        let started = std::time::Instant::now();
        timer.stop();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!timer.is_running());
    }

    #[test]
    fn no_events_after_stop_returns() {
        let (timer, rx) = recording_timer(Duration::from_millis(5), 100);
        timer.start(100);
        let _ = next(&rx);
        timer.stop();

        while rx.try_recv().is_ok() {}
        std::thread::sleep(Duration::from_millis(50));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn restart_replaces_running_countdown() {
        let (timer, rx) = recording_timer(Duration::from_secs(60), 30);
        timer.start(5);
        assert_eq!(next(&rx), Event::Update(5));

        timer.start(1);
        assert_eq!(next(&rx), Event::Update(1));
        assert_eq!(timer.seconds_left(), 1);
        timer.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let (timer, _rx) = recording_timer(Duration::from_millis(10), 1);
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());

        timer.start(1);
        timer.stop();
        timer.stop();
        assert!(!timer.is_running());
    }

    #[test]
    fn seconds_left_survives_stop() {
        let (timer, rx) = recording_timer(Duration::from_secs(60), 9);
        timer.start(2);
        assert_eq!(next(&rx), Event::Update(2));
        assert_eq!(timer.seconds_left(), 2);
        timer.stop();
        assert_eq!(timer.seconds_left(), 2);
    }
}
