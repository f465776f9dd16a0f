//! Step list construction and structural checks.
//!
//! Everything here is pure. The server remains the authority on whether a
//! definition is acceptable; these checks only catch what can be known
//! without asking it.

use crate::error::{ClientError, ClientResult};
use crate::model::{CycleBoundary, Cutoffs, Setpoints, Step, StepEntry, StepMode, TestDefinition};

const FORMATION_CC_TIMEOUT_S: f64 = 7200.0;
const FORMATION_CV_CHARGE_HOLD_S: f64 = 3600.0;
const FORMATION_CV_DISCHARGE_HOLD_S: f64 = 1800.0;
const FORMATION_CV_CUTOFF_A: f64 = 0.001;

/// Parameters for the canonical CC-CV charge / CC-CV discharge cycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StandardCycle {
    pub charge_current: f64,
    /// Negative for discharge.
    pub discharge_current: f64,
    pub charge_voltage: f64,
    pub discharge_voltage: f64,
    pub cv_cutoff_current: f64,
    pub cv_hold_time_s: f64,
    pub cc_timeout_s: f64,
}

impl Default for StandardCycle {
    fn default() -> Self {
        Self {
            charge_current: 0.01,
            discharge_current: -0.01,
            charge_voltage: 4.2,
            discharge_voltage: 3.0,
            cv_cutoff_current: 0.001,
            cv_hold_time_s: 1800.0,
            cc_timeout_s: 7200.0,
        }
    }
}

/// Parameters for a formation test: a conditioning pass at low current
/// followed by a pass at the normal rate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FormationCycle {
    pub formation_current: f64,
    pub normal_current: f64,
    pub charge_voltage: f64,
    pub discharge_voltage: f64,
}

impl Default for FormationCycle {
    fn default() -> Self {
        Self {
            formation_current: 0.002,
            normal_current: 0.020,
            charge_voltage: 4.2,
            discharge_voltage: 3.0,
        }
    }
}

fn cc_step(current: f64, cutoff_v: f64, timeout_s: f64) -> StepEntry {
    build_custom_step(
        StepMode::Cc,
        Setpoints {
            current: Some(current),
            voltage: None,
        },
        Cutoffs {
            voltage: Some(cutoff_v),
            time_s: Some(timeout_s),
            ..Default::default()
        },
    )
    .into()
}

fn cv_step(voltage: f64, cutoff_a: f64, hold_s: f64) -> StepEntry {
    build_custom_step(
        StepMode::Cv,
        Setpoints {
            current: None,
            voltage: Some(voltage),
        },
        Cutoffs {
            current: Some(cutoff_a),
            time_s: Some(hold_s),
            ..Default::default()
        },
    )
    .into()
}

/// CC charge, CV charge hold, CC discharge, CV discharge hold.
///
/// The charge hold uses `p.cv_hold_time_s`; the discharge hold may differ.
fn four_phase(p: &StandardCycle, discharge_hold_s: f64) -> [StepEntry; 4] {
    [
        cc_step(p.charge_current, p.charge_voltage, p.cc_timeout_s),
        cv_step(p.charge_voltage, p.cv_cutoff_current, p.cv_hold_time_s),
        cc_step(p.discharge_current, p.discharge_voltage, p.cc_timeout_s),
        cv_step(p.discharge_voltage, -p.cv_cutoff_current, discharge_hold_s),
    ]
}

pub fn build_standard_cycle(p: &StandardCycle) -> Vec<StepEntry> {
    let mut steps = Vec::with_capacity(6);
    steps.push(StepEntry::START);
    steps.extend(four_phase(p, p.cv_hold_time_s));
    steps.push(StepEntry::END);
    steps
}

/// Both passes go inside one marker pair. How the server maps requested
/// cycles onto the two passes is decided server-side.
pub fn build_formation_cycle(p: &FormationCycle) -> Vec<StepEntry> {
    let mut steps = Vec::with_capacity(10);
    steps.push(StepEntry::START);
    for current in [p.formation_current, p.normal_current] {
        let pass = StandardCycle {
            charge_current: current,
            discharge_current: -current,
            charge_voltage: p.charge_voltage,
            discharge_voltage: p.discharge_voltage,
            cv_cutoff_current: FORMATION_CV_CUTOFF_A,
            cv_hold_time_s: FORMATION_CV_CHARGE_HOLD_S,
            cc_timeout_s: FORMATION_CC_TIMEOUT_S,
        };
        steps.extend(four_phase(&pass, FORMATION_CV_DISCHARGE_HOLD_S));
    }
    steps.push(StepEntry::END);
    steps
}

/// Builds one step from whatever fields the caller set.
///
/// Nothing is checked here; a cc step without a current is representable so
/// that validation can report it.
pub fn build_custom_step(mode: StepMode, setpoints: Setpoints, cutoffs: Cutoffs) -> Step {
    Step {
        mode,
        current: setpoints.current,
        voltage: setpoints.voltage,
        cutoffs,
        extra: Default::default(),
    }
}

/// Checks marker placement, setpoints and cutoffs of a step list.
pub fn check_steps(steps: &[StepEntry]) -> ClientResult<()> {
    match steps.first() {
        Some(e) if e.boundary() == Some(CycleBoundary::Start) => {}
        _ => {
            return Err(ClientError::step_definition(
                r#"step list must begin with {"cycle":"start"}"#,
            ))
        }
    }
    match steps.last() {
        Some(e) if steps.len() > 1 && e.boundary() == Some(CycleBoundary::End) => {}
        _ => {
            return Err(ClientError::step_definition(
                r#"step list must end with {"cycle":"end"}"#,
            ))
        }
    }

    for (i, entry) in steps.iter().enumerate().take(steps.len() - 1).skip(1) {
        let step = match entry {
            StepEntry::Step(step) => step,
            StepEntry::Marker(_) => {
                return Err(ClientError::step_definition(format!(
                    "cycle marker at step {i}; markers are only allowed first and last"
                )))
            }
        };
        check_step(i, step)?;
    }
    Ok(())
}

fn check_step(i: usize, step: &Step) -> ClientResult<()> {
    match step.mode {
        StepMode::Cc => {
            if step.current.is_none() {
                return Err(ClientError::step_definition(format!(
                    "CC step missing current at step {i}"
                )));
            }
        }
        StepMode::Cv => {
            if step.voltage.is_none() {
                return Err(ClientError::step_definition(format!(
                    "CV step missing voltage at step {i}"
                )));
            }
        }
        StepMode::Ocv | StepMode::Rest => {
            if step.current.is_some() || step.voltage.is_some() {
                return Err(ClientError::step_definition(format!(
                    "{} step must not carry a setpoint at step {i}",
                    step.mode.as_str().to_uppercase()
                )));
            }
        }
    }
    if step.cutoffs.is_empty() {
        return Err(ClientError::step_definition(format!(
            "{} step has no cutoff at step {i}",
            step.mode.as_str().to_uppercase()
        )));
    }
    Ok(())
}

/// Full local check of a definition, including channel and cycle counts.
pub fn check_definition(def: &TestDefinition) -> ClientResult<()> {
    if def.channel < 1 {
        return Err(ClientError::step_definition("channel must be at least 1"));
    }
    if def.cycles < 1 {
        return Err(ClientError::step_definition("cycles must be at least 1"));
    }
    check_steps(&def.steps)
}
