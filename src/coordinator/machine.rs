//! Interaction state machine
//!
//! Consumes serialized events (poll snapshots, playback terminal events,
//! timers, asset-selection results) and returns the commands the runtime
//! driver must execute. Handlers are synchronous and non-reentrant; all
//! coordinator state lives here and is never mutated elsewhere.
//!
//! Stale input is rejected two ways: playback terminal events carry the
//! handle id they were started with, and deferred work (snapshot hold,
//! asset selection) carries a generation counter that every full reset
//! bumps. Either mismatch discards the event.

use super::state::{
    CoordinatorState, DetectionSnapshot, EmotionLabel, HandleId, InteractionMode, MediaKind,
    PlaybackOutcome,
};

/// Input to the state machine.
#[derive(Debug, Clone)]
pub enum Event {
    /// A merged poll result from the detection backend
    Status(DetectionSnapshot),
    /// The snapshot presentation hold expired
    SnapshotHoldElapsed { generation: u64 },
    /// Random-audio selection finished (`None` = missing asset or fetch failure)
    AudioSelected {
        generation: u64,
        url: Option<String>,
    },
    /// Random-video selection finished (`None` = missing asset or fetch failure)
    VideoSelected {
        generation: u64,
        url: Option<String>,
    },
    /// A playback handle reached its terminal state
    MediaFinished {
        kind: MediaKind,
        handle: HandleId,
        outcome: PlaybackOutcome,
    },
    /// The special-event timer fired
    SpecialTimerFired,
}

/// Side effect requested by a transition, executed by the driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Fetch and present the frozen detection snapshot
    ShowSnapshot { emotion: EmotionLabel },
    /// Arm the snapshot-hold timer
    ScheduleSnapshotHold { generation: u64 },
    /// Ask the backend for a random voice line in the given bucket
    SelectAudio {
        generation: u64,
        bucket: EmotionLabel,
    },
    /// Start audio playback
    PlayAudio { handle: HandleId, url: String },
    /// Ask the backend for a random interlude video
    SelectVideo { generation: u64 },
    /// Start fullscreen video playback
    PlayVideo { handle: HandleId, url: String },
    /// Start the special-event asset
    PlaySpecial { handle: HandleId },
    /// Stop any active audio (idempotent)
    StopAudio,
    /// Stop any active video (idempotent)
    StopVideo,
    /// One-shot fire-and-forget notification that a special event started
    NotifySpecialStart,
    /// Tell the backend to reset server-side detection state
    NotifyRestart,
    /// Arm the next special-event timer
    ScheduleSpecial { backoff: bool },
}

/// The interaction coordinator.
///
/// Owns the single mutable [`CoordinatorState`] instance plus the bookkeeping
/// needed to reject stale events.
pub struct Coordinator {
    state: CoordinatorState,
    /// Bumped on every full reset and every abandoned snapshot hold;
    /// deferred work from an older generation is discarded.
    generation: u64,
    next_handle: u64,
    audio_handle: Option<HandleId>,
    video_handle: Option<HandleId>,
}

impl Coordinator {
    pub fn new() -> Self {
        Self {
            state: CoordinatorState::default(),
            generation: 0,
            next_handle: 0,
            audio_handle: None,
            video_handle: None,
        }
    }

    /// Current presentation mode.
    pub fn mode(&self) -> InteractionMode {
        self.state.mode
    }

    /// Read-only view of the coordinator state.
    pub fn state(&self) -> &CoordinatorState {
        &self.state
    }

    /// Process one event and return the commands to execute, in order.
    pub fn handle(&mut self, event: Event) -> Vec<Command> {
        match event {
            Event::Status(snapshot) => self.on_status(snapshot),
            Event::SnapshotHoldElapsed { generation } => self.on_hold_elapsed(generation),
            Event::AudioSelected { generation, url } => self.on_audio_selected(generation, url),
            Event::VideoSelected { generation, url } => self.on_video_selected(generation, url),
            Event::MediaFinished {
                kind,
                handle,
                outcome,
            } => self.on_media_finished(kind, handle, outcome),
            Event::SpecialTimerFired => self.on_special_timer(),
        }
    }

    // --- Poll snapshot handling (priority order per transition rules) ---

    fn on_status(&mut self, snapshot: DetectionSnapshot) -> Vec<Command> {
        // The loop flag is bookkeeping, not a mode transition; track it even
        // in modes where the snapshot is otherwise ignored.
        let loop_rising = snapshot.loop_active && !self.state.loop_active;
        self.state.loop_active = snapshot.loop_active;

        // Rule 1: restart overrides everything, including a special event.
        if snapshot.restart_requested {
            return self.full_reset("restart requested");
        }

        // Rule 2: a new forced-video command preempts everything except an
        // already-active video. While a video owns the screen the command is
        // not adopted, so it fires once that video's reset clears the token.
        if let Some(id) = snapshot.forced_video.as_deref() {
            if self.state.forced_token.as_deref() != Some(id) {
                if self.state.mode.is_video_active() {
                    tracing::debug!(
                        "forced video '{}' deferred, video already active in {:?}",
                        id,
                        self.state.mode
                    );
                } else {
                    return self.start_forced_video(id.to_string());
                }
            }
            return Vec::new();
        }

        // Rule 3 applies only with no forced token outstanding.
        if self.state.forced_token.is_some() {
            return Vec::new();
        }

        match self.state.mode {
            InteractionMode::Idle => {
                if loop_rising {
                    // Backend entered video-loop mode: start chaining videos.
                    self.set_mode(InteractionMode::RandomVideo, "video loop started");
                    vec![Command::SelectVideo {
                        generation: self.generation,
                    }]
                } else if snapshot.detected {
                    self.state.current_emotion = snapshot.emotion;
                    self.set_mode(InteractionMode::SnapshotDisplay, "face detected");
                    vec![
                        Command::ShowSnapshot {
                            emotion: snapshot.emotion,
                        },
                        Command::ScheduleSnapshotHold {
                            generation: self.generation,
                        },
                    ]
                } else {
                    Vec::new()
                }
            }
            InteractionMode::SnapshotDisplay => {
                if !snapshot.detected {
                    // Detection lapsed before the hold expired; abandon the
                    // pending hold timer by moving to a new generation.
                    self.generation += 1;
                    self.set_mode(InteractionMode::Idle, "detection lapsed");
                }
                Vec::new()
            }
            // Rule 4: no re-entrancy while an activity is in flight.
            _ => Vec::new(),
        }
    }

    fn start_forced_video(&mut self, id: String) -> Vec<Command> {
        let mut commands = Vec::new();
        if self.state.audio_playing {
            commands.push(Command::StopAudio);
            self.state.audio_playing = false;
            self.audio_handle = None;
        }
        // Invalidate any pending hold timer or asset selection.
        self.generation += 1;
        self.state.forced_token = Some(id.clone());
        self.set_mode(InteractionMode::ForcedVideo, "forced video commanded");
        let handle = self.alloc_handle();
        self.video_handle = Some(handle);
        commands.push(Command::PlayVideo { handle, url: id });
        commands
    }

    // --- Deferred-work events ---

    fn on_hold_elapsed(&mut self, generation: u64) -> Vec<Command> {
        if generation != self.generation || self.state.mode != InteractionMode::SnapshotDisplay {
            tracing::debug!("stale snapshot-hold timer discarded");
            return Vec::new();
        }
        self.set_mode(InteractionMode::AudioPlayback, "snapshot hold expired");
        vec![Command::SelectAudio {
            generation: self.generation,
            bucket: self.state.current_emotion.audio_bucket(),
        }]
    }

    fn on_audio_selected(&mut self, generation: u64, url: Option<String>) -> Vec<Command> {
        if generation != self.generation || self.state.mode != InteractionMode::AudioPlayback {
            tracing::debug!("stale audio selection discarded");
            return Vec::new();
        }
        match url {
            Some(url) => {
                self.state.audio_playing = true;
                let handle = self.alloc_handle();
                self.audio_handle = Some(handle);
                vec![Command::PlayAudio { handle, url }]
            }
            None => {
                // Missing asset or failed fetch: absorbed, go straight to video.
                tracing::warn!("no audio asset available, skipping to video");
                self.start_random_video()
            }
        }
    }

    fn on_video_selected(&mut self, generation: u64, url: Option<String>) -> Vec<Command> {
        if generation != self.generation || self.state.mode != InteractionMode::RandomVideo {
            tracing::debug!("stale video selection discarded");
            return Vec::new();
        }
        match url {
            Some(url) => {
                let handle = self.alloc_handle();
                self.video_handle = Some(handle);
                vec![Command::PlayVideo { handle, url }]
            }
            None => {
                tracing::warn!("no video asset available, resetting");
                self.full_reset("no video asset")
            }
        }
    }

    // --- Playback terminal events ---

    fn on_media_finished(
        &mut self,
        kind: MediaKind,
        handle: HandleId,
        outcome: PlaybackOutcome,
    ) -> Vec<Command> {
        if outcome == PlaybackOutcome::Errored {
            tracing::warn!("{:?} playback {} errored, treating as ended", kind, handle);
        }
        match kind {
            MediaKind::Audio => {
                if self.audio_handle != Some(handle) {
                    tracing::debug!("stale audio terminal event {} discarded", handle);
                    return Vec::new();
                }
                self.audio_handle = None;
                self.state.audio_playing = false;
                if self.state.mode == InteractionMode::AudioPlayback {
                    self.start_random_video()
                } else {
                    Vec::new()
                }
            }
            MediaKind::Video => {
                if self.video_handle != Some(handle) {
                    tracing::debug!("stale video terminal event {} discarded", handle);
                    return Vec::new();
                }
                self.video_handle = None;
                match self.state.mode {
                    InteractionMode::RandomVideo => {
                        if self.state.loop_active {
                            // Loop mode chains videos instead of resetting.
                            vec![Command::SelectVideo {
                                generation: self.generation,
                            }]
                        } else {
                            self.full_reset("random video finished")
                        }
                    }
                    InteractionMode::ForcedVideo => {
                        self.state.forced_token = None;
                        self.full_reset("forced video finished")
                    }
                    InteractionMode::SpecialEvent => {
                        self.set_mode(InteractionMode::Idle, "special event finished");
                        vec![Command::ScheduleSpecial { backoff: false }]
                    }
                    _ => Vec::new(),
                }
            }
        }
    }

    // --- Special-event timer ---

    fn on_special_timer(&mut self) -> Vec<Command> {
        if self.state.mode != InteractionMode::Idle || self.state.forced_token.is_some() {
            tracing::debug!(
                "special event postponed, machine busy in {:?}",
                self.state.mode
            );
            return vec![Command::ScheduleSpecial { backoff: true }];
        }
        self.set_mode(InteractionMode::SpecialEvent, "special event timer fired");
        let handle = self.alloc_handle();
        self.video_handle = Some(handle);
        vec![
            Command::NotifySpecialStart,
            Command::PlaySpecial { handle },
        ]
    }

    // --- Shared transitions ---

    fn start_random_video(&mut self) -> Vec<Command> {
        self.set_mode(InteractionMode::RandomVideo, "audio phase complete");
        vec![Command::SelectVideo {
            generation: self.generation,
        }]
    }

    /// In-process equivalent of the legacy full page reload: stop everything,
    /// clear all tokens, return to idle, and tell the backend to resume
    /// detection.
    fn full_reset(&mut self, reason: &str) -> Vec<Command> {
        let was_special = self.state.mode == InteractionMode::SpecialEvent;
        self.state.forced_token = None;
        self.state.audio_playing = false;
        // The loop flag is forgotten too, so a backend still reporting
        // looping produces a fresh rising edge on the next poll and the
        // chain re-arms instead of wedging in Idle.
        self.state.loop_active = false;
        self.audio_handle = None;
        self.video_handle = None;
        self.generation += 1;
        self.set_mode(InteractionMode::Idle, reason);

        let mut commands = vec![Command::StopAudio, Command::StopVideo, Command::NotifyRestart];
        if was_special {
            // The pending timer was consumed by this event; re-arm it.
            commands.push(Command::ScheduleSpecial { backoff: false });
        }
        commands
    }

    fn set_mode(&mut self, mode: InteractionMode, reason: &str) {
        if self.state.mode != mode {
            tracing::info!(
                "mode transition: {:?} -> {:?} ({})",
                self.state.mode,
                mode,
                reason
            );
            self.state.mode = mode;
        }
    }

    fn alloc_handle(&mut self) -> HandleId {
        self.next_handle += 1;
        HandleId(self.next_handle)
    }

    /// Number of foreground activities currently claimed (0 or 1 by the
    /// mutual-exclusion invariant).
    #[cfg(test)]
    fn active_foreground_count(&self) -> usize {
        usize::from(self.audio_handle.is_some()) + usize::from(self.video_handle.is_some())
    }
}

impl Default for Coordinator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detected(emotion: EmotionLabel) -> DetectionSnapshot {
        DetectionSnapshot {
            detected: true,
            emotion,
            ..DetectionSnapshot::quiet()
        }
    }

    fn forced(id: &str) -> DetectionSnapshot {
        DetectionSnapshot {
            forced_video: Some(id.to_string()),
            ..DetectionSnapshot::quiet()
        }
    }

    fn restart() -> DetectionSnapshot {
        DetectionSnapshot {
            restart_requested: true,
            ..DetectionSnapshot::quiet()
        }
    }

    /// Drive the machine through snapshot display into audio playback and
    /// return the handle of the playing audio.
    fn advance_to_audio(c: &mut Coordinator, emotion: EmotionLabel) -> HandleId {
        let cmds = c.handle(Event::Status(detected(emotion)));
        let generation = match cmds[1] {
            Command::ScheduleSnapshotHold { generation } => generation,
            ref other => panic!("expected ScheduleSnapshotHold, got {:?}", other),
        };
        let cmds = c.handle(Event::SnapshotHoldElapsed { generation });
        let generation = match cmds[0] {
            Command::SelectAudio { generation, .. } => generation,
            ref other => panic!("expected SelectAudio, got {:?}", other),
        };
        let cmds = c.handle(Event::AudioSelected {
            generation,
            url: Some("voice.mp3".to_string()),
        });
        match cmds[0] {
            Command::PlayAudio { handle, .. } => handle,
            ref other => panic!("expected PlayAudio, got {:?}", other),
        }
    }

    #[test]
    fn test_starts_idle() {
        let c = Coordinator::new();
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(c.state().forced_token.is_none());
    }

    #[test]
    fn test_detection_enters_snapshot_display() {
        let mut c = Coordinator::new();
        let cmds = c.handle(Event::Status(detected(EmotionLabel::Happy)));

        assert_eq!(c.mode(), InteractionMode::SnapshotDisplay);
        assert_eq!(c.state().current_emotion, EmotionLabel::Happy);
        assert_eq!(
            cmds[0],
            Command::ShowSnapshot {
                emotion: EmotionLabel::Happy
            }
        );
        assert!(matches!(cmds[1], Command::ScheduleSnapshotHold { .. }));
    }

    #[test]
    fn test_undetected_snapshot_in_idle_is_ignored() {
        let mut c = Coordinator::new();
        let cmds = c.handle(Event::Status(DetectionSnapshot::quiet()));
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::Idle);
    }

    #[test]
    fn test_detection_lapse_reverts_to_idle() {
        let mut c = Coordinator::new();
        c.handle(Event::Status(detected(EmotionLabel::Sad)));
        assert_eq!(c.mode(), InteractionMode::SnapshotDisplay);

        c.handle(Event::Status(DetectionSnapshot::quiet()));
        assert_eq!(c.mode(), InteractionMode::Idle);

        // The abandoned hold timer must not fire the audio phase.
        let cmds = c.handle(Event::SnapshotHoldElapsed { generation: 0 });
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::Idle);
    }

    #[test]
    fn test_happy_path_end_to_end() {
        let mut c = Coordinator::new();

        // detected=true, emotion=happy -> SnapshotDisplay then AudioPlayback
        let cmds = c.handle(Event::Status(detected(EmotionLabel::Happy)));
        let generation = match cmds[1] {
            Command::ScheduleSnapshotHold { generation } => generation,
            _ => unreachable!(),
        };
        let cmds = c.handle(Event::SnapshotHoldElapsed { generation });
        assert_eq!(c.mode(), InteractionMode::AudioPlayback);
        assert_eq!(
            cmds[0],
            Command::SelectAudio {
                generation,
                bucket: EmotionLabel::Happy
            }
        );

        let cmds = c.handle(Event::AudioSelected {
            generation,
            url: Some("happy_01.mp3".to_string()),
        });
        let audio_handle = match cmds[0] {
            Command::PlayAudio { handle, .. } => handle,
            _ => unreachable!(),
        };
        assert!(c.state().audio_playing);

        // Audio ends -> RandomVideo
        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Audio,
            handle: audio_handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.mode(), InteractionMode::RandomVideo);
        assert!(matches!(cmds[0], Command::SelectVideo { .. }));

        let cmds = c.handle(Event::VideoSelected {
            generation,
            url: Some("clip1.mp4".to_string()),
        });
        let video_handle = match cmds[0] {
            Command::PlayVideo { handle, .. } => handle,
            _ => unreachable!(),
        };

        // Video ends -> full reset to Idle
        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Video,
            handle: video_handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(c.state().forced_token.is_none());
        assert!(!c.state().audio_playing);
        assert!(cmds.contains(&Command::NotifyRestart));
    }

    #[test]
    fn test_disgust_uses_neutral_audio_bucket() {
        let mut c = Coordinator::new();
        let cmds = c.handle(Event::Status(detected(EmotionLabel::Disgust)));
        let generation = match cmds[1] {
            Command::ScheduleSnapshotHold { generation } => generation,
            _ => unreachable!(),
        };
        let cmds = c.handle(Event::SnapshotHoldElapsed { generation });
        assert_eq!(
            cmds[0],
            Command::SelectAudio {
                generation,
                bucket: EmotionLabel::Neutral
            }
        );
    }

    #[test]
    fn test_missing_audio_asset_falls_through_to_video() {
        let mut c = Coordinator::new();
        c.handle(Event::Status(detected(EmotionLabel::Fear)));
        let cmds = c.handle(Event::SnapshotHoldElapsed { generation: 0 });
        let generation = match cmds[0] {
            Command::SelectAudio { generation, .. } => generation,
            _ => unreachable!(),
        };

        let cmds = c.handle(Event::AudioSelected {
            generation,
            url: None,
        });
        assert_eq!(c.mode(), InteractionMode::RandomVideo);
        assert_eq!(cmds, vec![Command::SelectVideo { generation }]);
        assert!(!c.state().audio_playing);
    }

    #[test]
    fn test_audio_error_treated_as_completion() {
        let mut c = Coordinator::new();
        let handle = advance_to_audio(&mut c, EmotionLabel::Angry);

        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Audio,
            handle,
            outcome: PlaybackOutcome::Errored,
        });
        assert_eq!(c.mode(), InteractionMode::RandomVideo);
        assert!(matches!(cmds[0], Command::SelectVideo { .. }));
    }

    #[test]
    fn test_missing_video_asset_resets() {
        let mut c = Coordinator::new();
        let handle = advance_to_audio(&mut c, EmotionLabel::Happy);
        c.handle(Event::MediaFinished {
            kind: MediaKind::Audio,
            handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.mode(), InteractionMode::RandomVideo);

        let generation = 0; // no reset has happened yet
        let cmds = c.handle(Event::VideoSelected {
            generation,
            url: None,
        });
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(cmds.contains(&Command::NotifyRestart));
    }

    #[test]
    fn test_restart_resets_from_every_mode() {
        // From audio playback
        let mut c = Coordinator::new();
        advance_to_audio(&mut c, EmotionLabel::Happy);
        let cmds = c.handle(Event::Status(restart()));
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(cmds.contains(&Command::StopAudio));
        assert!(cmds.contains(&Command::StopVideo));
        assert!(c.state().forced_token.is_none());

        // From forced video
        let mut c = Coordinator::new();
        c.handle(Event::Status(forced("clipA.mp4")));
        assert_eq!(c.mode(), InteractionMode::ForcedVideo);
        c.handle(Event::Status(restart()));
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(c.state().forced_token.is_none());

        // From a special event: reset must also re-arm the timer
        let mut c = Coordinator::new();
        c.handle(Event::SpecialTimerFired);
        assert_eq!(c.mode(), InteractionMode::SpecialEvent);
        let cmds = c.handle(Event::Status(restart()));
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(cmds.contains(&Command::ScheduleSpecial { backoff: false }));
    }

    #[test]
    fn test_forced_video_preempts_audio() {
        let mut c = Coordinator::new();
        let audio_handle = advance_to_audio(&mut c, EmotionLabel::Happy);

        let cmds = c.handle(Event::Status(forced("promo.mp4")));
        assert_eq!(c.mode(), InteractionMode::ForcedVideo);
        assert_eq!(c.state().forced_token.as_deref(), Some("promo.mp4"));
        assert_eq!(cmds[0], Command::StopAudio);
        assert!(matches!(cmds[1], Command::PlayVideo { .. }));

        // The stopped audio's terminal event is now stale.
        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Audio,
            handle: audio_handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::ForcedVideo);
    }

    #[test]
    fn test_duplicate_forced_token_is_idempotent() {
        let mut c = Coordinator::new();
        let cmds = c.handle(Event::Status(forced("clipA.mp4")));
        assert!(matches!(cmds.last(), Some(Command::PlayVideo { .. })));

        // Identical token on the next poll: no new playback start.
        let cmds = c.handle(Event::Status(forced("clipA.mp4")));
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::ForcedVideo);
    }

    #[test]
    fn test_forced_video_completion_clears_token() {
        let mut c = Coordinator::new();
        let cmds = c.handle(Event::Status(forced("clipA.mp4")));
        let handle = match cmds.last() {
            Some(Command::PlayVideo { handle, .. }) => *handle,
            _ => unreachable!(),
        };

        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Video,
            handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(c.state().forced_token.is_none());
        assert!(cmds.contains(&Command::NotifyRestart));

        // Same id arriving again now counts as a fresh command.
        let cmds = c.handle(Event::Status(forced("clipA.mp4")));
        assert!(matches!(cmds.last(), Some(Command::PlayVideo { .. })));
    }

    #[test]
    fn test_forced_video_deferred_while_video_active() {
        let mut c = Coordinator::new();
        c.handle(Event::Status(forced("first.mp4")));
        assert_eq!(c.mode(), InteractionMode::ForcedVideo);

        // A different forced id while a video plays is not adopted.
        let cmds = c.handle(Event::Status(forced("second.mp4")));
        assert!(cmds.is_empty());
        assert_eq!(c.state().forced_token.as_deref(), Some("first.mp4"));
    }

    #[test]
    fn test_detection_ignored_while_forced_token_outstanding() {
        let mut c = Coordinator::new();
        c.handle(Event::Status(forced("clipA.mp4")));

        let snapshot = DetectionSnapshot {
            detected: true,
            emotion: EmotionLabel::Happy,
            forced_video: Some("clipA.mp4".to_string()),
            ..DetectionSnapshot::quiet()
        };
        let cmds = c.handle(Event::Status(snapshot));
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::ForcedVideo);
    }

    #[test]
    fn test_no_reentrancy_during_audio_playback() {
        let mut c = Coordinator::new();
        advance_to_audio(&mut c, EmotionLabel::Happy);

        let cmds = c.handle(Event::Status(detected(EmotionLabel::Sad)));
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::AudioPlayback);
        // Emotion captured at detection time is preserved.
        assert_eq!(c.state().current_emotion, EmotionLabel::Happy);
    }

    #[test]
    fn test_special_event_postponed_while_busy() {
        let mut c = Coordinator::new();
        advance_to_audio(&mut c, EmotionLabel::Happy);

        let cmds = c.handle(Event::SpecialTimerFired);
        assert_eq!(cmds, vec![Command::ScheduleSpecial { backoff: true }]);
        assert_eq!(c.mode(), InteractionMode::AudioPlayback);
    }

    #[test]
    fn test_special_event_fires_from_idle_and_completes() {
        let mut c = Coordinator::new();
        let cmds = c.handle(Event::SpecialTimerFired);
        assert_eq!(c.mode(), InteractionMode::SpecialEvent);
        assert_eq!(cmds[0], Command::NotifySpecialStart);
        let handle = match cmds[1] {
            Command::PlaySpecial { handle } => handle,
            _ => unreachable!(),
        };

        // Snapshots are ignored while the special asset plays...
        let cmds = c.handle(Event::Status(detected(EmotionLabel::Happy)));
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::SpecialEvent);

        // ...and completion restores idle plus the next timer window.
        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Video,
            handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert_eq!(cmds, vec![Command::ScheduleSpecial { backoff: false }]);
    }

    #[test]
    fn test_restart_not_dropped_during_special_event() {
        let mut c = Coordinator::new();
        c.handle(Event::SpecialTimerFired);
        assert_eq!(c.mode(), InteractionMode::SpecialEvent);

        let cmds = c.handle(Event::Status(restart()));
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(cmds.contains(&Command::StopVideo));
    }

    #[test]
    fn test_loop_mode_chains_random_videos() {
        let mut c = Coordinator::new();
        let looping = DetectionSnapshot {
            loop_active: true,
            ..DetectionSnapshot::quiet()
        };

        let cmds = c.handle(Event::Status(looping.clone()));
        assert_eq!(c.mode(), InteractionMode::RandomVideo);
        assert!(matches!(cmds[0], Command::SelectVideo { .. }));

        let cmds = c.handle(Event::VideoSelected {
            generation: 0,
            url: Some("loop1.mp4".to_string()),
        });
        let handle = match cmds[0] {
            Command::PlayVideo { handle, .. } => handle,
            _ => unreachable!(),
        };

        // While looping, completion selects the next video instead of resetting.
        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Video,
            handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.mode(), InteractionMode::RandomVideo);
        assert!(matches!(cmds[0], Command::SelectVideo { .. }));

        // Loop flag dropping ends the chain on the next completion.
        c.handle(Event::Status(DetectionSnapshot::quiet()));
        let cmds = c.handle(Event::VideoSelected {
            generation: 0,
            url: Some("loop2.mp4".to_string()),
        });
        let handle = match cmds[0] {
            Command::PlayVideo { handle, .. } => handle,
            _ => unreachable!(),
        };
        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Video,
            handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(cmds.contains(&Command::NotifyRestart));
    }

    #[test]
    fn test_loop_chain_rearms_after_restart() {
        let mut c = Coordinator::new();
        let looping = DetectionSnapshot {
            loop_active: true,
            ..DetectionSnapshot::quiet()
        };
        c.handle(Event::Status(looping.clone()));
        assert_eq!(c.mode(), InteractionMode::RandomVideo);

        // Operator restart while the backend is still in loop mode.
        let cmds = c.handle(Event::Status(DetectionSnapshot {
            restart_requested: true,
            loop_active: true,
            ..DetectionSnapshot::quiet()
        }));
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(cmds.contains(&Command::NotifyRestart));

        // The next looping poll is a fresh rising edge.
        let cmds = c.handle(Event::Status(looping));
        assert_eq!(c.mode(), InteractionMode::RandomVideo);
        assert!(matches!(cmds[0], Command::SelectVideo { .. }));
    }

    #[test]
    fn test_missing_loop_video_recovers_into_loop_mode() {
        let mut c = Coordinator::new();
        let looping = DetectionSnapshot {
            loop_active: true,
            ..DetectionSnapshot::quiet()
        };
        c.handle(Event::Status(looping.clone()));

        // Selection comes back empty mid-chain: reset to Idle...
        let cmds = c.handle(Event::VideoSelected {
            generation: 0,
            url: None,
        });
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(cmds.contains(&Command::NotifyRestart));

        // ...and the still-looping backend restarts the chain.
        let cmds = c.handle(Event::Status(looping));
        assert_eq!(c.mode(), InteractionMode::RandomVideo);
        assert!(matches!(cmds[0], Command::SelectVideo { .. }));
    }

    #[test]
    fn test_stale_selection_after_reset_is_discarded() {
        let mut c = Coordinator::new();
        c.handle(Event::Status(detected(EmotionLabel::Happy)));
        let cmds = c.handle(Event::SnapshotHoldElapsed { generation: 0 });
        let generation = match cmds[0] {
            Command::SelectAudio { generation, .. } => generation,
            _ => unreachable!(),
        };

        // Restart arrives while the audio selection is in flight.
        c.handle(Event::Status(restart()));
        assert_eq!(c.mode(), InteractionMode::Idle);

        // The late selection result must not start playback.
        let cmds = c.handle(Event::AudioSelected {
            generation,
            url: Some("late.mp3".to_string()),
        });
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::Idle);
        assert!(!c.state().audio_playing);
    }

    #[test]
    fn test_stale_video_terminal_event_discarded() {
        let mut c = Coordinator::new();
        let cmds = c.handle(Event::Status(forced("clipA.mp4")));
        let handle = match cmds.last() {
            Some(Command::PlayVideo { handle, .. }) => *handle,
            _ => unreachable!(),
        };
        c.handle(Event::Status(restart()));

        let cmds = c.handle(Event::MediaFinished {
            kind: MediaKind::Video,
            handle,
            outcome: PlaybackOutcome::Ended,
        });
        assert!(cmds.is_empty());
        assert_eq!(c.mode(), InteractionMode::Idle);
    }

    #[test]
    fn test_mutual_exclusion_across_full_cycle() {
        let mut c = Coordinator::new();
        assert_eq!(c.active_foreground_count(), 0);

        c.handle(Event::Status(detected(EmotionLabel::Happy)));
        assert_eq!(c.active_foreground_count(), 0);

        let mut c = Coordinator::new();
        let audio = advance_to_audio(&mut c, EmotionLabel::Happy);
        assert_eq!(c.active_foreground_count(), 1);

        // Forced preemption swaps audio for video, never holds both.
        c.handle(Event::Status(forced("x.mp4")));
        assert_eq!(c.active_foreground_count(), 1);

        // Stale audio completion does not disturb the count.
        c.handle(Event::MediaFinished {
            kind: MediaKind::Audio,
            handle: audio,
            outcome: PlaybackOutcome::Ended,
        });
        assert_eq!(c.active_foreground_count(), 1);

        c.handle(Event::Status(restart()));
        assert_eq!(c.active_foreground_count(), 0);
    }
}
