use std::path::PathBuf;
use std::sync::mpsc::{Receiver, RecvTimeoutError, TryRecvError};
use std::time::Instant;

use anyhow::Result;

use super::{Controller, PlaybackState};

/// User intent delivered to the host loop.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    StartCamera(u32),
    LoadFile(PathBuf),
    /// Start a file directly, or the loaded one when `None`.
    StartFile(Option<PathBuf>),
    Pause,
    Resume,
    TogglePause,
    Stop,
    Reset,
    Quit,
}

impl Command {
    /// Map one line of keyboard input to a command.
    ///
    /// `space`/`p` toggle pause, `s` stops, `r` resets, `q`/`esc` quit,
    /// `c [index]` starts a camera, `l <path>` loads a file and `v [path]`
    /// plays one.
    pub fn parse(input: &str) -> Option<Self> {
        let line = input.trim_end_matches(['\r', '\n']);
        if line == " " {
            return Some(Self::TogglePause);
        }
        let line = line.trim();
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let command = match word.to_ascii_lowercase().as_str() {
            "space" | "p" => Self::TogglePause,
            "pause" => Self::Pause,
            "resume" => Self::Resume,
            "s" | "stop" => Self::Stop,
            "r" | "reset" => Self::Reset,
            "q" | "esc" | "quit" => Self::Quit,
            "c" | "camera" if rest.is_empty() => Self::StartCamera(0),
            "c" | "camera" => Self::StartCamera(rest.parse().ok()?),
            "l" | "load" if !rest.is_empty() => Self::LoadFile(PathBuf::from(rest)),
            "v" | "video" if rest.is_empty() => Self::StartFile(None),
            "v" | "video" => Self::StartFile(Some(PathBuf::from(rest))),
            _ => return None,
        };
        Some(command)
    }
}

/// Single-threaded host loop.
///
/// Holds the one pending tick deadline and interleaves ticks with commands
/// arriving on the channel.
pub struct EventLoop {
    controller: Controller,
    commands: Receiver<Command>,
    deadline: Option<Instant>,
    exit_when_idle: bool,
    disconnected: bool,
}

impl EventLoop {
    pub fn new(controller: Controller, commands: Receiver<Command>) -> Self {
        Self {
            controller,
            commands,
            deadline: None,
            exit_when_idle: false,
            disconnected: false,
        }
    }

    /// Return from `run()` once nothing is playing and no tick is pending.
    pub fn exit_when_idle(mut self, exit: bool) -> Self {
        self.exit_when_idle = exit;
        self
    }

    pub fn controller(&self) -> &Controller {
        &self.controller
    }

    pub fn into_controller(self) -> Controller {
        self.controller
    }

    /// Dispatch one command. Failures are already on the status line.
    pub fn apply(&mut self, command: Command) {
        log::debug!("EventLoop: {:?}", command);
        let ctl = &mut self.controller;
        let result = match command {
            Command::StartCamera(index) => ctl.start_camera(index),
            Command::LoadFile(path) => ctl.load_file(path),
            Command::StartFile(Some(path)) => ctl.start_file(path),
            Command::StartFile(None) => ctl.start_loaded(),
            Command::Reset => ctl.reset(),
            Command::Pause => {
                ctl.pause();
                Ok(())
            }
            Command::Resume => {
                ctl.resume();
                Ok(())
            }
            Command::TogglePause => {
                ctl.toggle_pause();
                Ok(())
            }
            Command::Stop => {
                ctl.stop();
                Ok(())
            }
            Command::Quit => {
                ctl.quit();
                Ok(())
            }
        };
        if let Err(err) = result {
            log::debug!("EventLoop: command failed: {}", err);
        }
        self.absorb_schedule();
    }

    pub fn run(&mut self) -> Result<()> {
        loop {
            self.drain_commands();
            if self.controller.quit_requested() {
                break;
            }
            let Some(deadline) = self.deadline else {
                if self.is_idle() && (self.exit_when_idle || self.disconnected) {
                    break;
                }
                match self.commands.recv() {
                    Ok(command) => self.apply(command),
                    Err(_) => self.disconnected = true,
                }
                continue;
            };

            let wait = deadline.saturating_duration_since(Instant::now());
            if !wait.is_zero() {
                if self.disconnected {
                    std::thread::sleep(wait);
                } else {
                    match self.commands.recv_timeout(wait) {
                        Ok(command) => {
                            self.apply(command);
                            continue;
                        }
                        Err(RecvTimeoutError::Timeout) => {}
                        Err(RecvTimeoutError::Disconnected) => {
                            self.disconnected = true;
                            continue;
                        }
                    }
                }
            }

            self.deadline = None;
            self.controller.tick();
            self.absorb_schedule();
        }
        log::info!(
            "EventLoop: exiting in state {:?} after {} frames",
            self.controller.state(),
            self.controller.stats().frames_processed
        );
        Ok(())
    }

    fn drain_commands(&mut self) {
        loop {
            match self.commands.try_recv() {
                Ok(command) => self.apply(command),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.disconnected = true;
                    break;
                }
            }
        }
    }

    /// Move the controller's requested delay into the single deadline slot.
    fn absorb_schedule(&mut self) {
        if let Some(delay) = self.controller.take_scheduled_tick() {
            self.deadline = Some(Instant::now() + delay);
        }
    }

    fn is_idle(&self) -> bool {
        matches!(
            self.controller.state(),
            PlaybackState::Stopped | PlaybackState::Ended
        )
    }
}
