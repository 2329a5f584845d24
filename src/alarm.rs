use tracing::{debug, info};

/// An unacknowledged alarm silences itself after this long.
pub const AUTO_STOP_MS: u64 = 60_000;

/// Burst cadence: beep, 300ms, beep, 300ms, beep, 1000ms rest, repeat.
pub const BEEP_GAP_MS: u64 = 300;
pub const BURST_REST_MS: u64 = 1_000;

pub const DOWN_TONE_HZ: u32 = 700;
pub const DOWN_TONE_MS: u32 = 140;
pub const UP_TONE_HZ: u32 = 1_200;
pub const UP_TONE_MS: u32 = 110;

/// Audible output of the probe. `silence` cuts any tone in progress.
pub trait ToneSink: Send {
    fn emit_tone(&mut self, freq_hz: u32, duration_ms: u32);
    fn silence(&mut self);
}

/// Single global alarm shared by all targets. Any down transition
/// triggers it; triggers while it is already active are absorbed
/// without restarting the timeout window.
#[derive(Debug, Default)]
pub struct AlarmScheduler {
    active: bool,
    started_ms: u64,
    next_event_ms: u64,
    step: u8,
    stop_requested: bool,
}

impl AlarmScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn trigger(&mut self, now_ms: u64) {
        if self.active {
            return;
        }
        self.active = true;
        self.started_ms = now_ms;
        self.next_event_ms = now_ms;
        self.step = 0;
        self.stop_requested = false;
    }

    /// Operator acknowledgement. Takes effect on the next tick; ignored
    /// while the alarm is idle.
    pub fn request_stop(&mut self) {
        if self.active {
            self.stop_requested = true;
        }
    }

    /// Advance the alarm, emitting at most one beep per call. Timeout
    /// is checked before the acknowledgement and before any beep.
    pub fn tick(&mut self, now_ms: u64, sink: &mut impl ToneSink) {
        if !self.active {
            return;
        }

        if now_ms - self.started_ms >= AUTO_STOP_MS {
            info!("alarm timed out unacknowledged");
            self.stop(sink);
            return;
        }

        if self.stop_requested {
            info!("alarm acknowledged");
            self.stop(sink);
            return;
        }

        if now_ms >= self.next_event_ms {
            sink.emit_tone(DOWN_TONE_HZ, DOWN_TONE_MS);
            self.next_event_ms = now_ms
                + if self.step == 2 {
                    BURST_REST_MS
                } else {
                    BEEP_GAP_MS
                };
            self.step = (self.step + 1) % 3;
        }
    }

    /// A target came back up: stop the alarm (if any) and play the
    /// recovery chirp. The chirp plays even when no alarm was active.
    pub fn notify_recovery(&mut self, sink: &mut impl ToneSink) {
        self.stop(sink);
        sink.emit_tone(UP_TONE_HZ, UP_TONE_MS);
    }

    fn stop(&mut self, sink: &mut impl ToneSink) {
        self.active = false;
        self.stop_requested = false;
        self.step = 0;
        sink.silence();
    }
}

/// Tone sink for builds without a buzzer: tones land in the log.
#[derive(Debug, Default)]
pub struct LogTone;

impl ToneSink for LogTone {
    fn emit_tone(&mut self, freq_hz: u32, duration_ms: u32) {
        info!(freq_hz, duration_ms, "tone");
    }

    fn silence(&mut self) {
        debug!("tone sink silenced");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    pub(crate) struct RecordingTone {
        pub(crate) tones: Vec<(u64, u32, u32)>,
        pub(crate) silences: u32,
        now_ms: u64,
    }

    impl RecordingTone {
        fn at(&mut self, now_ms: u64) -> &mut Self {
            self.now_ms = now_ms;
            self
        }
    }

    impl ToneSink for RecordingTone {
        fn emit_tone(&mut self, freq_hz: u32, duration_ms: u32) {
            self.tones.push((self.now_ms, freq_hz, duration_ms));
        }

        fn silence(&mut self) {
            self.silences += 1;
        }
    }

    fn drive(alarm: &mut AlarmScheduler, sink: &mut RecordingTone, from_ms: u64, to_ms: u64) {
        let mut now = from_ms;
        while now <= to_ms {
            alarm.tick(now, sink.at(now));
            now += 50;
        }
    }

    #[test]
    fn burst_follows_300_300_1000_cadence() {
        let mut alarm = AlarmScheduler::new();
        let mut sink = RecordingTone::default();

        alarm.trigger(0);
        drive(&mut alarm, &mut sink, 0, 2000);

        let times: Vec<u64> = sink.tones.iter().map(|(t, _, _)| *t).collect();
        assert_eq!(times, [0, 300, 600, 1600, 1900]);
        assert!(sink.tones.iter().all(|&(_, f, d)| f == DOWN_TONE_HZ && d == DOWN_TONE_MS));
    }

    #[test]
    fn auto_stops_after_exactly_sixty_seconds() {
        let mut alarm = AlarmScheduler::new();
        let mut sink = RecordingTone::default();

        alarm.trigger(0);
        drive(&mut alarm, &mut sink, 0, AUTO_STOP_MS - 50);
        assert!(alarm.is_active());

        alarm.tick(AUTO_STOP_MS, sink.at(AUTO_STOP_MS));
        assert!(!alarm.is_active());
        assert_eq!(sink.silences, 1);
        // The timeout tick never beeps.
        assert!(sink.tones.iter().all(|&(t, _, _)| t < AUTO_STOP_MS));
    }

    #[test]
    fn retrigger_while_active_keeps_the_original_window() {
        let mut alarm = AlarmScheduler::new();
        let mut sink = RecordingTone::default();

        alarm.trigger(0);
        drive(&mut alarm, &mut sink, 0, 30_000);
        // A second target going down must not extend the timeout.
        alarm.trigger(30_000);
        drive(&mut alarm, &mut sink, 30_050, AUTO_STOP_MS - 50);
        assert!(alarm.is_active());
        alarm.tick(AUTO_STOP_MS, sink.at(AUTO_STOP_MS));
        assert!(!alarm.is_active());
    }

    #[test]
    fn acknowledgement_silences_on_the_next_tick() {
        let mut alarm = AlarmScheduler::new();
        let mut sink = RecordingTone::default();

        alarm.trigger(0);
        alarm.tick(0, sink.at(0));
        assert_eq!(sink.tones.len(), 1);

        alarm.request_stop();
        alarm.tick(50, sink.at(50));
        assert!(!alarm.is_active());
        assert_eq!(sink.silences, 1);
        // No further beeps after the acknowledgement.
        drive(&mut alarm, &mut sink, 100, 2000);
        assert_eq!(sink.tones.len(), 1);
    }

    #[test]
    fn stop_request_while_idle_is_ignored() {
        let mut alarm = AlarmScheduler::new();
        let mut sink = RecordingTone::default();

        alarm.request_stop();
        alarm.trigger(100);
        alarm.tick(100, sink.at(100));
        // The stale request must not cancel the fresh alarm.
        assert!(alarm.is_active());
        assert_eq!(sink.tones.len(), 1);
    }

    #[test]
    fn recovery_chirp_plays_even_when_alarm_is_idle() {
        let mut alarm = AlarmScheduler::new();
        let mut sink = RecordingTone::default();

        alarm.notify_recovery(sink.at(500));
        assert_eq!(sink.tones, [(500, UP_TONE_HZ, UP_TONE_MS)]);
        assert_eq!(sink.silences, 1);
    }

    #[test]
    fn recovery_stops_an_active_alarm_before_the_chirp() {
        let mut alarm = AlarmScheduler::new();
        let mut sink = RecordingTone::default();

        alarm.trigger(0);
        alarm.tick(0, sink.at(0));
        alarm.notify_recovery(sink.at(600));

        assert!(!alarm.is_active());
        assert_eq!(sink.silences, 1);
        assert_eq!(sink.tones.last(), Some(&(600, UP_TONE_HZ, UP_TONE_MS)));
        // Stopped for good; nothing more fires.
        drive(&mut alarm, &mut sink, 650, 3000);
        assert_eq!(sink.tones.len(), 2);
    }
}
