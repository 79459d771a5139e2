//! Simulation variants, the editable parameter form and validated parameters.
//!
//! A [`ParameterForm`] holds raw user input exactly as typed. Calling
//! [`ParameterForm::validate`] produces [`SimulationParameters`], from which
//! the child's argument vector is built in a fixed order.

use crate::runner::{RunnerError, RunnerResult};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Flag passed to the basic protocol script to turn on verbose output.
pub const VERBOSE_FLAG: &str = "v";
pub const DEFAULT_KEY_LENGTH: &str = "64";
pub const DEFAULT_ITERATIONS: &str = "200";
/// Slider positions are hundredths of the probability they represent.
pub const SLIDER_SCALE: f64 = 100.0;

/// The four simulation scripts the launcher knows how to drive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationVariant {
    /// Single-shot protocol run.
    #[default]
    Basic,
    /// Iterative run against an ideal attacker.
    IdealAttack,
    /// Iterative run with amplitude and phase damping noise.
    DampingNoise,
    /// Iterative run with bit-flip and phase-flip noise.
    FlipNoise,
}

/// Labels and bound for a variant's pair of noise sliders.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NoiseSpec {
    pub first_label: &'static str,
    pub second_label: &'static str,
    /// Upper bound in slider ticks (hundredths).
    pub max_ticks: u32,
}

impl NoiseSpec {
    #[must_use]
    pub fn max(&self) -> f64 {
        f64::from(self.max_ticks) / SLIDER_SCALE
    }
}

impl SimulationVariant {
    pub const ALL: [Self; 4] = [
        Self::Basic,
        Self::IdealAttack,
        Self::DampingNoise,
        Self::FlipNoise,
    ];

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Basic => "1. Basic Protocol",
            Self::IdealAttack => "2. Ideal Attack (Iterative)",
            Self::DampingNoise => "3. Damping Noise (Iterative)",
            Self::FlipNoise => "4. Flip Noise (Iterative)",
        }
    }

    #[must_use]
    pub fn default_script(self) -> &'static str {
        match self {
            Self::Basic => "QZKP_barebones.py",
            Self::IdealAttack => "QZKP_attack_ideal.py",
            Self::DampingNoise => "QZKP_noise_damping.py",
            Self::FlipNoise => "QZKP_noise_flip.py",
        }
    }

    /// Iterative variants report progress per iteration and write a CSV.
    #[must_use]
    pub fn is_iterative(self) -> bool {
        !matches!(self, Self::Basic)
    }

    #[must_use]
    pub fn noise(self) -> Option<NoiseSpec> {
        match self {
            Self::Basic | Self::IdealAttack => None,
            Self::DampingNoise => Some(NoiseSpec {
                first_label: "Gamma (Amp Damping)",
                second_label: "Lambda (Phase Damping)",
                max_ticks: 50,
            }),
            Self::FlipNoise => Some(NoiseSpec {
                first_label: "Bit-Flip Probability",
                second_label: "Phase-Flip Probability",
                max_ticks: 10,
            }),
        }
    }

    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Basic => Self::IdealAttack,
            Self::IdealAttack => Self::DampingNoise,
            Self::DampingNoise => Self::FlipNoise,
            Self::FlipNoise => Self::Basic,
        }
    }

    #[must_use]
    pub fn previous(self) -> Self {
        match self {
            Self::Basic => Self::FlipNoise,
            Self::IdealAttack => Self::Basic,
            Self::DampingNoise => Self::IdealAttack,
            Self::FlipNoise => Self::DampingNoise,
        }
    }
}

impl fmt::Display for SimulationVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A validated noise probability in `[0, max]`.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Probability(f64);

impl Probability {
    #[must_use]
    pub fn value(self) -> f64 {
        self.0
    }

    /// Fixed four-decimal text form the simulation scripts parse.
    #[must_use]
    pub fn as_arg(self) -> String {
        format!("{:.4}", self.0)
    }
}

/// Raw noise input: a slider position or a typed decimal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NoiseInput {
    /// Slider position in hundredths.
    Slider(u32),
    /// Decimal probability as typed, e.g. `"0.25"`.
    Text(String),
}

impl NoiseInput {
    /// Move a slider one tick, staying within `[0, max_ticks]`.
    ///
    /// Typed values snap to the nearest slider position first.
    #[must_use]
    pub fn step(&self, up: bool, max_ticks: u32) -> Self {
        let ticks = self.ticks(max_ticks);
        let ticks = if up {
            ticks.saturating_add(1).min(max_ticks)
        } else {
            ticks.saturating_sub(1)
        };
        Self::Slider(ticks)
    }

    fn ticks(&self, max_ticks: u32) -> u32 {
        match self {
            Self::Slider(ticks) => (*ticks).min(max_ticks),
            Self::Text(text) => {
                let parsed = text.trim().parse::<f64>().unwrap_or(0.0);
                (0..=max_ticks)
                    .min_by(|a, b| {
                        let da = (f64::from(*a) / SLIDER_SCALE - parsed).abs();
                        let db = (f64::from(*b) / SLIDER_SCALE - parsed).abs();
                        da.total_cmp(&db)
                    })
                    .unwrap_or(0)
            }
        }
    }

    fn validate(&self, label: &str, spec: NoiseSpec) -> RunnerResult<Probability> {
        let value = match self {
            Self::Slider(ticks) => {
                if *ticks > spec.max_ticks {
                    return Err(out_of_range(label, spec));
                }
                f64::from(*ticks) / SLIDER_SCALE
            }
            Self::Text(text) => text
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|value| value.is_finite())
                .ok_or_else(|| RunnerError::parameter(format!("{label} must be a number")))?,
        };
        if !(0.0..=spec.max()).contains(&value) {
            return Err(out_of_range(label, spec));
        }
        Ok(Probability(value))
    }

    /// Display text with two decimals, as shown next to a slider.
    #[must_use]
    pub fn display(&self) -> String {
        match self {
            Self::Slider(ticks) => format!("{:.2}", f64::from(*ticks) / SLIDER_SCALE),
            Self::Text(text) => text.clone(),
        }
    }
}

fn out_of_range(label: &str, spec: NoiseSpec) -> RunnerError {
    RunnerError::parameter(format!(
        "{label} must be between 0.0 and {}",
        spec.max()
    ))
}

/// Editable state of the parameter panel.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ParameterForm {
    pub variant: SimulationVariant,
    pub key_length: String,
    pub iterations: String,
    pub noise_a: NoiseInput,
    pub noise_b: NoiseInput,
    pub attacker: bool,
}

impl Default for ParameterForm {
    fn default() -> Self {
        Self::new(SimulationVariant::Basic)
    }
}

impl ParameterForm {
    #[must_use]
    pub fn new(variant: SimulationVariant) -> Self {
        Self {
            variant,
            key_length: DEFAULT_KEY_LENGTH.to_string(),
            iterations: DEFAULT_ITERATIONS.to_string(),
            noise_a: NoiseInput::Slider(1),
            noise_b: NoiseInput::Slider(2),
            attacker: true,
        }
    }

    /// Parse and range-check every field the selected variant uses.
    ///
    /// Fields the variant does not use are ignored.
    pub fn validate(&self) -> RunnerResult<SimulationParameters> {
        let key_length = parse_positive("Key length", &self.key_length)?;
        if !self.variant.is_iterative() {
            return Ok(SimulationParameters::Basic { key_length });
        }
        let iterations = parse_positive("No. of iterations", &self.iterations)?;
        let Some(noise) = self.variant.noise() else {
            return Ok(SimulationParameters::IdealAttack {
                key_length,
                iterations,
            });
        };
        let first = self.noise_a.validate(noise.first_label, noise)?;
        let second = self.noise_b.validate(noise.second_label, noise)?;
        let attacker = self.attacker;
        Ok(match self.variant {
            SimulationVariant::FlipNoise => SimulationParameters::FlipNoise {
                key_length,
                iterations,
                bit_flip: first,
                phase_flip: second,
                attacker,
            },
            _ => SimulationParameters::DampingNoise {
                key_length,
                iterations,
                gamma: first,
                lambda: second,
                attacker,
            },
        })
    }
}

/// A positive decimal integer of any size, kept as canonical text.
///
/// The scripts receive the value as an argument string, so there is no
/// upper bound; leading zeros are dropped.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct PositiveInt(String);

impl PositiveInt {
    /// Accepts only plain ASCII digits with at least one non-zero digit.
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        let digits = raw.trim_start_matches('0');
        (!digits.is_empty()).then(|| Self(digits.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for PositiveInt {
    type Error = String;

    fn try_from(raw: String) -> Result<Self, Self::Error> {
        Self::parse(&raw).ok_or_else(|| format!("{raw:?} is not a positive integer"))
    }
}

impl From<PositiveInt> for String {
    fn from(value: PositiveInt) -> Self {
        value.0
    }
}

impl fmt::Display for PositiveInt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn parse_positive(label: &str, raw: &str) -> RunnerResult<PositiveInt> {
    PositiveInt::parse(raw)
        .ok_or_else(|| RunnerError::parameter(format!("{label} must be a positive integer")))
}

/// Typed parameters for one run, one shape per variant.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "snake_case")]
pub enum SimulationParameters {
    Basic {
        key_length: PositiveInt,
    },
    IdealAttack {
        key_length: PositiveInt,
        iterations: PositiveInt,
    },
    DampingNoise {
        key_length: PositiveInt,
        iterations: PositiveInt,
        gamma: Probability,
        lambda: Probability,
        attacker: bool,
    },
    FlipNoise {
        key_length: PositiveInt,
        iterations: PositiveInt,
        bit_flip: Probability,
        phase_flip: Probability,
        attacker: bool,
    },
}

impl SimulationParameters {
    #[must_use]
    pub fn variant(&self) -> SimulationVariant {
        match self {
            Self::Basic { .. } => SimulationVariant::Basic,
            Self::IdealAttack { .. } => SimulationVariant::IdealAttack,
            Self::DampingNoise { .. } => SimulationVariant::DampingNoise,
            Self::FlipNoise { .. } => SimulationVariant::FlipNoise,
        }
    }

    /// Script arguments in the order the simulations expect them.
    ///
    /// Key length always comes first. The basic variant then takes the
    /// verbose flag; iterative variants take the iteration count followed,
    /// for noise variants, by both probabilities and the attacker flag.
    #[must_use]
    pub fn to_args(&self) -> Vec<String> {
        match self {
            Self::Basic { key_length } => vec![key_length.to_string(), VERBOSE_FLAG.to_string()],
            Self::IdealAttack {
                key_length,
                iterations,
            } => vec![key_length.to_string(), iterations.to_string()],
            Self::DampingNoise {
                key_length,
                iterations,
                gamma: first,
                lambda: second,
                attacker,
            }
            | Self::FlipNoise {
                key_length,
                iterations,
                bit_flip: first,
                phase_flip: second,
                attacker,
            } => vec![
                key_length.to_string(),
                iterations.to_string(),
                first.as_arg(),
                second.as_arg(),
                attacker_flag(*attacker).to_string(),
            ],
        }
    }
}

/// The scripts read the attacker flag as a capitalised boolean.
fn attacker_flag(enabled: bool) -> &'static str {
    if enabled {
        "True"
    } else {
        "False"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runner::ErrorCode;

    fn form(variant: SimulationVariant, key: &str, iterations: &str) -> ParameterForm {
        ParameterForm {
            key_length: key.to_string(),
            iterations: iterations.to_string(),
            ..ParameterForm::new(variant)
        }
    }

    #[test]
    fn accepts_positive_integer_key_lengths() {
        for key in ["1", "64", "1024", "007", "99999999999999999999999"] {
            let params = form(SimulationVariant::Basic, key, "").validate();
            assert!(params.is_ok(), "{key} should be accepted");
        }
    }

    #[test]
    fn key_lengths_beyond_u64_pass_through_as_canonical_text() {
        let args = form(SimulationVariant::IdealAttack, "0018446744073709551616", "0200")
            .validate()
            .map(|params| params.to_args())
            .ok();
        assert_eq!(
            args,
            Some(vec!["18446744073709551616".to_string(), "200".to_string()])
        );
    }

    #[test]
    fn positive_int_deserialization_is_validated() {
        let parsed: Result<PositiveInt, _> = serde_json::from_str("\"0042\"");
        assert_eq!(parsed.ok().map(String::from), Some("42".to_string()));
        assert!(serde_json::from_str::<PositiveInt>("\"0\"").is_err());
    }

    #[test]
    fn rejects_non_positive_or_non_numeric_key_lengths() {
        for key in ["", "0", "000", "-3", "+5", " 5", "5 ", "abc", "3.0", "٣"] {
            let err = form(SimulationVariant::Basic, key, "")
                .validate()
                .err()
                .map(|err| err.code);
            assert_eq!(err, Some(ErrorCode::Parameter), "{key:?} should be rejected");
        }
    }

    #[test]
    fn rejects_zero_iterations_for_iterative_variants() {
        let err = form(SimulationVariant::IdealAttack, "32", "0")
            .validate()
            .err();
        assert_eq!(
            err.map(|err| err.message),
            Some("No. of iterations must be a positive integer".to_string())
        );
    }

    #[test]
    fn basic_variant_ignores_iterations_and_appends_verbose_flag() {
        let params = form(SimulationVariant::Basic, "64", "not a number")
            .validate()
            .map(|params| params.to_args());
        assert_eq!(params.ok(), Some(vec!["64".to_string(), "v".to_string()]));
    }

    #[test]
    fn damping_arguments_use_four_decimals() {
        let mut damping = form(SimulationVariant::DampingNoise, "32", "100");
        damping.noise_a = NoiseInput::Slider(25);
        damping.noise_b = NoiseInput::Slider(2);
        let args = damping.validate().map(|params| params.to_args()).ok();
        assert_eq!(
            args,
            Some(vec![
                "32".to_string(),
                "100".to_string(),
                "0.2500".to_string(),
                "0.0200".to_string(),
                "True".to_string(),
            ])
        );
    }

    #[test]
    fn flip_arguments_carry_attacker_flag_last() {
        let mut flip = form(SimulationVariant::FlipNoise, "16", "10");
        flip.noise_a = NoiseInput::Text("0.05".to_string());
        flip.noise_b = NoiseInput::Slider(10);
        flip.attacker = false;
        let args = flip.validate().map(|params| params.to_args()).ok();
        assert_eq!(
            args,
            Some(vec![
                "16".to_string(),
                "10".to_string(),
                "0.0500".to_string(),
                "0.1000".to_string(),
                "False".to_string(),
            ])
        );
    }

    #[test]
    fn noise_values_above_the_variant_maximum_are_rejected() {
        let mut flip = form(SimulationVariant::FlipNoise, "16", "10");
        flip.noise_a = NoiseInput::Text("0.2".to_string());
        assert!(flip.validate().is_err());

        let mut damping = form(SimulationVariant::DampingNoise, "16", "10");
        damping.noise_b = NoiseInput::Slider(51);
        assert!(damping.validate().is_err());

        damping.noise_b = NoiseInput::Text("nan".to_string());
        assert!(damping.validate().is_err());
    }

    #[test]
    fn argument_construction_is_deterministic() {
        let damping = form(SimulationVariant::DampingNoise, "48", "7");
        let first = damping.validate().map(|params| params.to_args()).ok();
        let second = damping.validate().map(|params| params.to_args()).ok();
        assert!(first.is_some());
        assert_eq!(first, second);
    }

    #[test]
    fn slider_steps_stay_in_bounds() {
        let spec = SimulationVariant::FlipNoise.noise();
        let max = spec.map_or(0, |spec| spec.max_ticks);
        assert_eq!(NoiseInput::Slider(10).step(true, max), NoiseInput::Slider(10));
        assert_eq!(NoiseInput::Slider(0).step(false, max), NoiseInput::Slider(0));
        assert_eq!(
            NoiseInput::Text("0.05".to_string()).step(true, max),
            NoiseInput::Slider(6)
        );
    }

    #[test]
    fn variant_cycle_visits_every_variant() {
        let mut seen = vec![SimulationVariant::Basic];
        let mut current = SimulationVariant::Basic.next();
        while current != SimulationVariant::Basic {
            seen.push(current);
            current = current.next();
        }
        assert_eq!(seen, SimulationVariant::ALL.to_vec());
        assert_eq!(SimulationVariant::Basic.previous(), SimulationVariant::FlipNoise);
    }
}
