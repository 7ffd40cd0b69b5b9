//! In-memory stand-ins for the console, signals, termios, syslog, clock and
//! screen. Clones share state so a test can keep a handle after giving one
//! away.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::sys::termios::Termios;
use nix::unistd::Uid;
use zeroize::Zeroizing;

use super::audit::AuditSink;
use super::clock::Clock;
use super::privilege::{Credential, CredentialStore, PrivilegeError, PrivilegeManager, UserRecord};
use super::prompt::{Housekeeping, Key, LockScreen};
use super::session::DisplayDriver;
use super::signals::SignalRouting;
use super::termmode::{TermModeError, TermiosPort};
use super::verify::{AuthError, CredentialVerifier};
use super::vt::{VtDevice, VtError, VtMode, VT_AUTO, VT_PROCESS};

pub const TEST_HASH: &str = "$6$tsstestsalt$abcdefghijklmnopqrstuvwxyz";

/// Ordered record of side effects across several fakes.
#[derive(Clone, Default)]
pub struct Journal(Rc<RefCell<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    fn record(journal: &Option<Journal>, event: &str) {
        if let Some(journal) = journal {
            journal.0.borrow_mut().push(event.to_string());
        }
    }
}

// Console

#[derive(Default)]
struct VtInner {
    mode: VtMode,
    set_mode_calls: usize,
    releases: Vec<bool>,
    fail_get: bool,
    fail_set: bool,
    journal: Option<Journal>,
}

#[derive(Clone, Default)]
pub struct FakeVt(Rc<RefCell<VtInner>>);

impl FakeVt {
    pub fn new() -> Self {
        Self::default()
    }

    /// VT_GETMODE fails, as on a pty or serial line.
    pub fn not_a_console() -> Self {
        let vt = Self::new();
        vt.0.borrow_mut().fail_get = true;
        vt
    }

    pub fn rejecting_setmode() -> Self {
        let vt = Self::new();
        vt.0.borrow_mut().fail_set = true;
        vt
    }

    pub fn with_journal(self, journal: &Journal) -> Self {
        self.0.borrow_mut().journal = Some(journal.clone());
        self
    }

    pub fn current_mode(&self) -> VtMode {
        self.0.borrow().mode
    }

    pub fn set_mode_calls(&self) -> usize {
        self.0.borrow().set_mode_calls
    }

    pub fn releases(&self) -> Vec<bool> {
        self.0.borrow().releases.clone()
    }
}

impl VtDevice for FakeVt {
    fn get_mode(&self) -> Result<VtMode, VtError> {
        let inner = self.0.borrow();
        if inner.fail_get {
            return Err(VtError::NotLockable(Errno::ENOTTY));
        }
        Ok(inner.mode)
    }

    fn set_mode(&self, mode: &VtMode) -> Result<(), VtError> {
        let mut inner = self.0.borrow_mut();
        inner.set_mode_calls += 1;
        if inner.fail_set {
            return Err(VtError::SetMode(Errno::EPERM));
        }
        inner.mode = *mode;
        let name = match mode.mode {
            VT_AUTO => "auto",
            VT_PROCESS => "process",
            _ => "other",
        };
        Journal::record(&inner.journal, &format!("vt:set_mode:{}", name));
        Ok(())
    }

    fn release_display(&self, allow: bool) -> Result<(), VtError> {
        let mut inner = self.0.borrow_mut();
        inner.releases.push(allow);
        Journal::record(&inner.journal, &format!("vt:release_display:{}", allow));
        Ok(())
    }
}

// Signals

#[derive(Default)]
struct SignalsInner {
    isolated: bool,
    isolations: usize,
    restores: usize,
    pending: bool,
    fail_isolate: bool,
    journal: Option<Journal>,
}

#[derive(Clone, Default)]
pub struct FakeSignals(Rc<RefCell<SignalsInner>>);

impl FakeSignals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(self, journal: &Journal) -> Self {
        self.0.borrow_mut().journal = Some(journal.clone());
        self
    }

    /// Isolation gets as far as the mask, then a handler install fails.
    pub fn failing_isolate() -> Self {
        let signals = Self::default();
        signals.0.borrow_mut().fail_isolate = true;
        signals
    }

    pub fn isolated(&self) -> bool {
        self.0.borrow().isolated
    }

    pub fn isolations(&self) -> usize {
        self.0.borrow().isolations
    }

    pub fn restores(&self) -> usize {
        self.0.borrow().restores
    }

    /// Simulate the kernel asking to switch away.
    pub fn request_switch(&self) {
        self.0.borrow_mut().pending = true;
    }
}

impl SignalRouting for FakeSignals {
    fn isolate(&mut self) -> Result<(), VtError> {
        let mut inner = self.0.borrow_mut();
        inner.isolated = true;
        inner.isolations += 1;
        Journal::record(&inner.journal, "signals:isolate");
        if inner.fail_isolate {
            return Err(VtError::Signals(Signal::SIGUSR1, Errno::EINVAL));
        }
        Ok(())
    }

    fn restore(&mut self) -> Result<(), VtError> {
        let mut inner = self.0.borrow_mut();
        if !inner.isolated {
            return Ok(());
        }
        inner.isolated = false;
        inner.restores += 1;
        Journal::record(&inner.journal, "signals:restore");
        Ok(())
    }

    fn switch_requested(&mut self) -> bool {
        std::mem::take(&mut self.0.borrow_mut().pending)
    }
}

// Termios

/// Attributes of an ordinary interactive terminal.
pub fn cooked_termios() -> Termios {
    // Safety: libc::termios is plain data, all-zero is a valid value
    let mut raw: libc::termios = unsafe { std::mem::zeroed() };
    raw.c_iflag = libc::BRKINT | libc::IXON | libc::ICRNL;
    raw.c_oflag = libc::OPOST | libc::ONLCR;
    raw.c_lflag = libc::ISIG | libc::ICANON | libc::ECHO | libc::IEXTEN;
    Termios::from(raw)
}

struct TermiosInner {
    current: Termios,
    writes: usize,
    fail_writes: bool,
    journal: Option<Journal>,
}

#[derive(Clone)]
pub struct FakeTermios(Rc<RefCell<TermiosInner>>);

impl FakeTermios {
    pub fn new() -> Self {
        Self(Rc::new(RefCell::new(TermiosInner {
            current: cooked_termios(),
            writes: 0,
            fail_writes: false,
            journal: None,
        })))
    }

    pub fn with_journal(self, journal: &Journal) -> Self {
        self.0.borrow_mut().journal = Some(journal.clone());
        self
    }

    pub fn fail_writes(&self) {
        self.0.borrow_mut().fail_writes = true;
    }

    pub fn current(&self) -> Termios {
        self.0.borrow().current.clone()
    }

    /// Successful tcsetattr calls so far.
    pub fn writes(&self) -> usize {
        self.0.borrow().writes
    }
}

impl TermiosPort for FakeTermios {
    fn get(&self) -> Result<Termios, TermModeError> {
        Ok(self.current())
    }

    fn set(&self, termios: &Termios) -> Result<(), TermModeError> {
        let mut inner = self.0.borrow_mut();
        if inner.fail_writes {
            return Err(TermModeError::Set(Errno::EIO));
        }
        inner.current = termios.clone();
        inner.writes += 1;
        Journal::record(&inner.journal, "termios:set");
        Ok(())
    }
}

// Audit

#[derive(Clone, Default)]
pub struct RecordingAudit(Rc<RefCell<Vec<String>>>);

impl RecordingAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl AuditSink for RecordingAudit {
    fn failed_login(&self, username: &str) {
        self.0.borrow_mut().push(username.to_string());
    }
}

// Credentials

pub fn test_credential() -> Credential {
    Credential::new("alice", TEST_HASH.to_string()).expect("test hash is long enough")
}

/// User 1000 ("alice") with the given shadow hash.
pub struct FakeStore {
    hash: &'static str,
}

impl CredentialStore for FakeStore {
    fn user_by_uid(&self, uid: Uid) -> Result<Option<UserRecord>, PrivilegeError> {
        if uid.as_raw() != 1000 {
            return Ok(None);
        }
        Ok(Some(UserRecord {
            name: "alice".to_string(),
            passwd: Zeroizing::new("x".to_string()),
        }))
    }

    fn shadow_hash(&self, _username: &str) -> Option<Zeroizing<String>> {
        Some(Zeroizing::new(self.hash.to_string()))
    }
}

pub fn fake_privileges() -> PrivilegeManager<FakeStore> {
    fake_privileges_with_hash(TEST_HASH)
}

pub fn fake_privileges_with_hash(hash: &'static str) -> PrivilegeManager<FakeStore> {
    PrivilegeManager::new(FakeStore { hash })
}

/// Accepts exactly one secret and remembers every candidate it saw.
pub struct CountingVerifier {
    expected: Vec<u8>,
    calls: Cell<usize>,
    seen: RefCell<Vec<Vec<u8>>>,
}

impl CountingVerifier {
    pub fn accepting(secret: &str) -> Self {
        Self {
            expected: secret.as_bytes().to_vec(),
            calls: Cell::new(0),
            seen: RefCell::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.get()
    }

    pub fn seen(&self) -> Vec<Vec<u8>> {
        self.seen.borrow().clone()
    }
}

impl CredentialVerifier for CountingVerifier {
    fn verify(&self, candidate: &[u8], _credential: &Credential) -> Result<bool, AuthError> {
        self.calls.set(self.calls.get() + 1);
        self.seen.borrow_mut().push(candidate.to_vec());
        Ok(candidate == self.expected.as_slice())
    }
}

// Time

/// Moves forward by a fixed step on every `now()` and by the full amount on
/// every `sleep()`.
pub struct FakeClock {
    base: Instant,
    offset: Cell<Duration>,
    step: Duration,
    sleeps: RefCell<Vec<Duration>>,
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            step: Duration::from_millis(100),
            sleeps: RefCell::new(Vec::new()),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }

    pub fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.borrow().clone()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        let offset = self.offset.get();
        self.offset.set(offset + self.step);
        self.base + offset
    }

    fn sleep(&self, duration: Duration) {
        self.sleeps.borrow_mut().push(duration);
        self.offset.set(self.offset.get() + duration);
    }
}

#[derive(Default)]
pub struct IdleTicks {
    count: usize,
}

impl IdleTicks {
    pub fn count(&self) -> usize {
        self.count
    }
}

impl Housekeeping for IdleTicks {
    fn on_tick(&mut self) -> Result<(), crate::lock::vt::VtError> {
        self.count += 1;
        Ok(())
    }
}

// Screen

enum Step {
    Key(Key),
    /// Nothing typed until the next prompt appears
    Stall,
}

/// Lock screen fed from a fixed key script. Once the script runs out no
/// more keys arrive.
pub struct ScriptedScreen {
    script: VecDeque<Step>,
    attached_checks: Cell<usize>,
    detach_after: Option<usize>,
    prompts: Vec<String>,
    countdowns: Vec<Duration>,
    rejections: usize,
}

impl ScriptedScreen {
    fn from_steps(script: VecDeque<Step>) -> Self {
        Self {
            script,
            attached_checks: Cell::new(0),
            detach_after: None,
            prompts: Vec::new(),
            countdowns: Vec::new(),
            rejections: 0,
        }
    }

    pub fn keys(keys: Vec<Key>) -> Self {
        Self::from_steps(keys.into_iter().map(Step::Key).collect())
    }

    /// `text` followed by Enter.
    pub fn typing(text: &str) -> Self {
        Self::attempts(&[text])
    }

    /// One prompt per entry, each answered with the text and Enter.
    pub fn attempts(texts: &[&str]) -> Self {
        let mut steps = VecDeque::new();
        for text in texts {
            steps.extend(text.chars().map(|ch| Step::Key(Key::Char(ch))));
            steps.push_back(Step::Key(Key::Enter));
        }
        Self::from_steps(steps)
    }

    /// The first prompt gets no input at all, then as [`attempts`](Self::attempts).
    pub fn attempts_with_timeout_first(texts: &[&str]) -> Self {
        let mut screen = Self::attempts(texts);
        screen.script.push_front(Step::Stall);
        screen
    }

    /// Report the terminal as gone after `checks` attachment checks.
    pub fn detached_after(mut self, checks: usize) -> Self {
        self.detach_after = Some(checks);
        self
    }

    pub fn prompts_drawn(&self) -> Vec<String> {
        self.prompts.clone()
    }

    pub fn countdown_ticks(&self) -> Vec<Duration> {
        self.countdowns.clone()
    }

    pub fn rejections(&self) -> usize {
        self.rejections
    }
}

impl LockScreen for ScriptedScreen {
    fn flush_input(&mut self) -> io::Result<()> {
        if matches!(self.script.front(), Some(Step::Stall)) && !self.prompts.is_empty() {
            self.script.pop_front();
        }
        Ok(())
    }

    fn draw_prompt(&mut self, username: &str) -> io::Result<()> {
        self.prompts.push(username.to_string());
        Ok(())
    }

    fn draw_countdown(&mut self, elapsed: Duration, _timeout: Duration) -> io::Result<()> {
        self.countdowns.push(elapsed);
        Ok(())
    }

    fn show_rejection(&mut self) -> io::Result<()> {
        self.rejections += 1;
        Ok(())
    }

    fn clear(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn poll_key(&mut self, _wait: Duration) -> io::Result<Option<Key>> {
        match self.script.front() {
            Some(Step::Stall) | None => Ok(None),
            Some(Step::Key(_)) => match self.script.pop_front() {
                Some(Step::Key(key)) => Ok(Some(key)),
                _ => Ok(None),
            },
        }
    }

    fn is_attached(&self) -> bool {
        let checks = self.attached_checks.get() + 1;
        self.attached_checks.set(checks);
        self.detach_after.map_or(true, |limit| checks <= limit)
    }
}

/// Display that reports a wake-up key on every `wake_every`-th poll.
pub struct FakeDisplay {
    wake_every: usize,
    polls: usize,
    frames: usize,
    pauses: usize,
    resumes: usize,
    shutdowns: usize,
    journal: Option<Journal>,
}

impl FakeDisplay {
    pub fn waking_after(polls: usize) -> Self {
        Self {
            wake_every: polls.max(1),
            polls: 0,
            frames: 0,
            pauses: 0,
            resumes: 0,
            shutdowns: 0,
            journal: None,
        }
    }

    pub fn with_journal(mut self, journal: &Journal) -> Self {
        self.journal = Some(journal.clone());
        self
    }

    pub fn shutdowns(&self) -> usize {
        self.shutdowns
    }

    pub fn always_waking() -> Self {
        Self::waking_after(1)
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn pauses(&self) -> usize {
        self.pauses
    }

    pub fn resumes(&self) -> usize {
        self.resumes
    }
}

impl DisplayDriver for FakeDisplay {
    fn pause_rendering(&mut self) -> io::Result<()> {
        self.pauses += 1;
        Ok(())
    }

    fn resume_rendering(&mut self) -> io::Result<()> {
        self.resumes += 1;
        Ok(())
    }

    fn draw_frame(&mut self) -> io::Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn poll_wake_input(&mut self) -> io::Result<bool> {
        self.polls += 1;
        Ok(self.polls % self.wake_every == 0)
    }

    fn shutdown(&mut self) -> io::Result<()> {
        self.shutdowns += 1;
        Journal::record(&self.journal, "display:shutdown");
        Ok(())
    }
}
