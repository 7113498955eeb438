use anyhow::Result;
use serde::Serialize;
use std::fmt::Write as _;

const REVERB_PRESETS: [(&str, f32); 4] = [
    ("Hall (2 Bars)", 2.0),
    ("Large Room (1 Bar)", 1.0),
    ("Small Room (1/2 Note)", 0.5),
    ("Tight Ambience (1/4 Note)", 0.25),
];

const NOTE_VALUES: [(&str, f32); 7] = [
    ("1/1", 1.0),
    ("1/2", 0.5),
    ("1/4", 0.25),
    ("1/8", 0.125),
    ("1/16", 0.0625),
    ("1/32", 0.03125),
    ("1/64", 0.015625),
];

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ReverbTiming {
    pub name: &'static str,
    pub pre_delay_ms: f32,
    pub decay_ms: f32,
    pub total_ms: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DelayTiming {
    pub note: &'static str,
    pub straight_ms: f32,
    pub dotted_ms: f32,
    pub triplet_ms: f32,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimingTable {
    pub bpm: f32,
    pub reverb: Vec<ReverbTiming>,
    pub delay: Vec<DelayTiming>,
}

/// Reverb and delay times derived from a tempo.
pub fn timing_table(bpm: f32) -> Result<TimingTable> {
    if !bpm.is_finite() || bpm <= 0.0 {
        anyhow::bail!("BPM must be a positive number, got {}", bpm);
    }
    let beat_ms = 60_000.0 / bpm;

    let reverb = REVERB_PRESETS
        .iter()
        .map(|&(name, whole_notes)| {
            let total_ms = beat_ms * 4.0 * whole_notes;
            let pre_delay_ms = beat_ms / 16.0;
            ReverbTiming {
                name,
                pre_delay_ms,
                decay_ms: total_ms - pre_delay_ms,
                total_ms,
            }
        })
        .collect();

    let delay = NOTE_VALUES
        .iter()
        .map(|&(note, factor)| {
            let straight_ms = beat_ms * 4.0 * factor;
            DelayTiming {
                note,
                straight_ms,
                dotted_ms: straight_ms * 1.5,
                triplet_ms: straight_ms * 2.0 / 3.0,
            }
        })
        .collect();

    Ok(TimingTable { bpm, reverb, delay })
}

impl TimingTable {
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Reverb @ {} BPM", self.bpm);
        let _ = writeln!(
            out,
            "  {:<26} {:>12} {:>12} {:>12}",
            "Preset", "Pre-delay", "Decay", "Total"
        );
        for r in &self.reverb {
            let _ = writeln!(
                out,
                "  {:<26} {:>12.2} {:>12.2} {:>12.2}",
                r.name, r.pre_delay_ms, r.decay_ms, r.total_ms
            );
        }
        let _ = writeln!(out, "Delay @ {} BPM", self.bpm);
        let _ = writeln!(
            out,
            "  {:<6} {:>12} {:>12} {:>12}",
            "Note", "Straight", "Dotted", "Triplet"
        );
        for d in &self.delay {
            let _ = writeln!(
                out,
                "  {:<6} {:>9.2} ms {:>9.2} ms {:>9.2} ms",
                d.note, d.straight_ms, d.dotted_ms, d.triplet_ms
            );
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-3
    }

    #[test]
    fn reverb_at_120() {
        let table = timing_table(120.0).unwrap();
        let hall = &table.reverb[0];
        assert_eq!(hall.name, "Hall (2 Bars)");
        assert!(close(hall.total_ms, 4000.0));
        assert!(close(hall.pre_delay_ms, 31.25));
        assert!(close(hall.decay_ms, 3968.75));

        let tight = &table.reverb[3];
        assert!(close(tight.total_ms, 500.0));
        assert!(close(tight.decay_ms, 468.75));
    }

    #[test]
    fn delay_at_120() {
        let table = timing_table(120.0).unwrap();
        assert_eq!(table.delay.len(), 7);
        let quarter = &table.delay[2];
        assert_eq!(quarter.note, "1/4");
        assert!(close(quarter.straight_ms, 500.0));
        assert!(close(quarter.dotted_ms, 750.0));
        assert!(close(quarter.triplet_ms, 333.333));
        assert!(close(table.delay[6].straight_ms, 31.25));
    }

    #[test]
    fn rejects_non_positive_bpm() {
        assert!(timing_table(0.0).is_err());
        assert!(timing_table(-90.0).is_err());
        assert!(timing_table(f32::NAN).is_err());
        assert!(timing_table(f32::INFINITY).is_err());
    }

    #[test]
    fn render_has_two_decimals() {
        let text = timing_table(120.0).unwrap().render();
        assert!(text.contains("Reverb @ 120 BPM"));
        assert!(text.contains("3968.75"));
        assert!(text.contains("333.33 ms"));
    }
}
