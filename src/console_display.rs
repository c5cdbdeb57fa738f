use crate::types::DisplayFrame;
use crossbeam_channel::Receiver;
use std::io::{self, Write};

/// Renders a live ASCII dashboard of the visualizer state: vertical
/// spectrum bars with peak markers plus note and particle counters.
pub struct ConsoleDisplay {
    rx: Receiver<DisplayFrame>,
    update_hz: u32,
}

/// Rows of the ASCII spectrum display.
const SPECTRUM_ROWS: usize = 16;

impl ConsoleDisplay {
    pub fn new(rx: Receiver<DisplayFrame>, update_hz: u32) -> Self {
        Self { rx, update_hz }
    }

    pub fn run(&self) {
        let skip = if self.update_hz == 0 {
            6
        } else {
            (60 / self.update_hz).max(1) as u64
        };
        let mut count: u64 = 0;
        let mut stdout = io::stdout();

        for frame in self.rx.iter() {
            count += 1;
            if count % skip != 0 {
                continue;
            }

            // Clear screen and move cursor home
            print!("\x1b[2J\x1b[H");

            let width = frame.bars.len().max(16);
            let rule = "═".repeat(width + 4);
            println!("╔{}╗", rule);
            println!("║  NOTEFALL — Live Monitor{}║", " ".repeat(width.saturating_sub(23)));
            println!("╠{}╣", rule);

            let secs = frame.timestamp_us as f64 / 1_000_000.0;
            let status = if frame.playing { "playing" } else { "paused " };
            println!(
                "║  t={:>8.2}s  {}  notes:{:>3}  held:{:>3}  particles:{:>4}",
                secs, status, frame.archived_notes, frame.active_notes, frame.live_particles
            );
            println!("║");

            for line in spectrum_rows(&frame.bars, &frame.peaks, SPECTRUM_ROWS) {
                println!("║  {}", line);
            }
            println!("╚{}╝", rule);
            let _ = stdout.flush();
        }
    }
}

/// Render bars (one column per band) into text rows, top row first.
/// Peak-hold values show as `▪` markers above the bar tops.
fn spectrum_rows(bars: &[f32], peaks: &[f32], rows: usize) -> Vec<String> {
    (0..rows)
        .map(|row| {
            // Threshold for this row, 1.0 at the top row
            let level = (rows - row) as f32 / rows as f32;
            bars.iter()
                .zip(peaks.iter().chain(std::iter::repeat(&0.0)))
                .map(|(&b, &p)| {
                    if b >= level {
                        '█'
                    } else if p >= level && p < level + 1.0 / rows as f32 {
                        '▪'
                    } else {
                        ' '
                    }
                })
                .collect()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spectrum_rows_shape() {
        let bars = vec![0.0, 0.5, 1.0];
        let peaks = vec![0.0, 0.8, 1.0];
        let rows = spectrum_rows(&bars, &peaks, 10);
        assert_eq!(rows.len(), 10);
        assert!(rows.iter().all(|r| r.chars().count() == 3));
        // Silent band stays empty in every row
        assert!(rows.iter().all(|r| r.chars().next() == Some(' ')));
        // Full-scale band fills the top row
        assert_eq!(rows[0].chars().nth(2), Some('█'));
        // Half-scale band fills the bottom row but not the top
        assert_eq!(rows[9].chars().nth(1), Some('█'));
        assert_eq!(rows[0].chars().nth(1), Some(' '));
    }

    #[test]
    fn test_peak_marker_above_bar() {
        let bars = vec![0.3];
        let peaks = vec![0.8];
        let rows = spectrum_rows(&bars, &peaks, 10);
        // Peak 0.8 sits in the row whose threshold bracket contains it
        let marker_rows: Vec<usize> = rows
            .iter()
            .enumerate()
            .filter(|(_, r)| r.contains('▪'))
            .map(|(i, _)| i)
            .collect();
        assert_eq!(marker_rows.len(), 1);
        assert!(marker_rows[0] < 7, "marker above the 0.3 bar top");
    }
}
