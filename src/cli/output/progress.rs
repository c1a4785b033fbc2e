//! Progress display for a synthesis run using indicatif.
//!
//! One overall bar counts settled units; one spinner per active unit shows
//! its current phase. Everything is drawn on stderr and hidden in JSON mode.

use std::collections::HashMap;
use std::time::Duration;

use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};

use crate::domain::models::{UnitId, UnitPhase};
use crate::services::ControllerEvent;

/// Style templates for different progress bar types
const PROGRESS_TEMPLATE: &str = "[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}";
const SPINNER_TEMPLATE: &str = "  {spinner:.green} {prefix:.bold} {msg}";

/// Progress bar characters for visual effect
const PROGRESS_CHARS: &str = "█▓▒░ ";
const SPINNER_CHARS: &str = "⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ";

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(PROGRESS_TEMPLATE)
        .map(|style| style.progress_chars(PROGRESS_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_bar())
}

fn spinner_style() -> ProgressStyle {
    ProgressStyle::default_spinner()
        .template(SPINNER_TEMPLATE)
        .map(|style| style.tick_chars(SPINNER_CHARS))
        .unwrap_or_else(|_| ProgressStyle::default_spinner())
}

/// Renders [`ControllerEvent`]s as live progress.
pub struct RunProgress {
    multi: MultiProgress,
    overall: ProgressBar,
    units: HashMap<UnitId, ProgressBar>,
}

impl RunProgress {
    pub fn new() -> Self {
        let multi = MultiProgress::with_draw_target(ProgressDrawTarget::stderr());
        Self::with_multi(multi)
    }

    /// Progress that draws nothing (JSON mode, non-interactive runs).
    pub fn hidden() -> Self {
        Self::with_multi(MultiProgress::with_draw_target(ProgressDrawTarget::hidden()))
    }

    fn with_multi(multi: MultiProgress) -> Self {
        let overall = multi.add(ProgressBar::new(0));
        overall.set_style(bar_style());
        overall.set_message("measuring baseline");
        overall.enable_steady_tick(Duration::from_millis(200));
        Self {
            multi,
            overall,
            units: HashMap::new(),
        }
    }

    fn unit_spinner(&mut self, unit_id: &UnitId) -> &ProgressBar {
        let multi = &self.multi;
        self.units.entry(unit_id.clone()).or_insert_with(|| {
            let spinner = multi.add(ProgressBar::new_spinner());
            spinner.set_style(spinner_style());
            spinner.set_prefix(unit_id.file_name().to_string());
            spinner.enable_steady_tick(Duration::from_millis(100));
            spinner
        })
    }

    pub fn handle(&mut self, event: &ControllerEvent) {
        match event {
            ControllerEvent::BaselineMeasured {
                aggregate,
                total_units,
                ..
            } => {
                self.overall.set_length(*total_units as u64);
                self.overall.set_message(format!("aggregate {aggregate:.1}%"));
            }
            ControllerEvent::PhaseChanged {
                unit_id,
                phase,
                attempt,
            } => {
                let spinner = self.unit_spinner(unit_id);
                spinner.set_message(format!("{} (attempt {attempt})", phase_label(*phase)));
            }
            ControllerEvent::Committed {
                unit_id,
                unit_coverage,
                aggregate,
            } => {
                let spinner = self.unit_spinner(unit_id);
                spinner.set_message(format!("committed, unit {unit_coverage:.1}%"));
                self.overall.set_message(format!("aggregate {aggregate:.1}%"));
            }
            ControllerEvent::RolledBack { unit_id, reason } => {
                let spinner = self.unit_spinner(unit_id);
                spinner.set_message(format!("rolled back: {}", super::truncate(reason, 60)));
            }
            ControllerEvent::UnitFinished {
                unit_id,
                phase,
                coverage,
            } => {
                if let Some(spinner) = self.units.remove(unit_id) {
                    spinner.finish_and_clear();
                }
                self.overall.inc(1);
                self.multi
                    .println(format!(
                        "{} {unit_id} {coverage:.1}%",
                        if *phase == UnitPhase::Done { "✓" } else { "✗" }
                    ))
                    .ok();
            }
            ControllerEvent::RunFinished { aggregate, .. } => {
                for (_, spinner) in self.units.drain() {
                    spinner.finish_and_clear();
                }
                self.overall
                    .finish_with_message(format!("aggregate {aggregate:.1}%"));
            }
        }
    }
}

impl Default for RunProgress {
    fn default() -> Self {
        Self::new()
    }
}

fn phase_label(phase: UnitPhase) -> &'static str {
    match phase {
        UnitPhase::Pending => "waiting",
        UnitPhase::Generating => "generating",
        UnitPhase::Validating => "validating",
        UnitPhase::Measuring => "measuring",
        UnitPhase::Committed => "committed",
        UnitPhase::RolledBack => "rolled back",
        UnitPhase::Done => "done",
        UnitPhase::Exhausted => "exhausted",
    }
}
