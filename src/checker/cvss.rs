//! CVSS score extraction.
//!
//! OSV reports severity either as a bare number or as a vector string. CVSS
//! v3.0/v3.1 vectors are scored with the v3.1 base-score equations; other
//! vector versions yield no score.

/// Parses a numeric score or a CVSS v3 vector into a base score.
pub fn parse_cvss_score(score: &str) -> Option<f64> {
    let score = score.trim();

    if let Ok(value) = score.parse::<f64>() {
        return (0.0..=10.0).contains(&value).then_some(value);
    }

    if score.starts_with("CVSS:3.") {
        return base_score_v3(score);
    }

    None
}

/// Computes the CVSS v3.1 base score of a vector such as
/// `CVSS:3.1/AV:N/AC:L/PR:N/UI:N/S:U/C:H/I:H/A:H`.
pub fn base_score_v3(vector: &str) -> Option<f64> {
    let mut av = None;
    let mut ac = None;
    let mut pr = None;
    let mut ui = None;
    let mut scope_changed = None;
    let mut c = None;
    let mut i = None;
    let mut a = None;

    for metric in vector.split('/').skip(1) {
        let (key, value) = metric.split_once(':')?;
        match key {
            "AV" => av = Some(attack_vector(value)?),
            "AC" => ac = Some(attack_complexity(value)?),
            "PR" => pr = Some(value),
            "UI" => ui = Some(user_interaction(value)?),
            "S" => {
                scope_changed = Some(match value {
                    "U" => false,
                    "C" => true,
                    _ => return None,
                })
            }
            "C" => c = Some(impact(value)?),
            "I" => i = Some(impact(value)?),
            "A" => a = Some(impact(value)?),
            // temporal and environmental metrics do not affect the base score
            _ => {}
        }
    }

    let scope_changed = scope_changed?;
    let pr = privileges_required(pr?, scope_changed)?;
    let (av, ac, ui) = (av?, ac?, ui?);
    let (c, i, a) = (c?, i?, a?);

    let iss = 1.0 - (1.0 - c) * (1.0 - i) * (1.0 - a);
    let impact = if scope_changed {
        7.52 * (iss - 0.029) - 3.25 * (iss - 0.02).powi(15)
    } else {
        6.42 * iss
    };
    let exploitability = 8.22 * av * ac * pr * ui;

    if impact <= 0.0 {
        return Some(0.0);
    }

    let raw = if scope_changed {
        (1.08 * (impact + exploitability)).min(10.0)
    } else {
        (impact + exploitability).min(10.0)
    };
    Some(round_up(raw))
}

fn attack_vector(value: &str) -> Option<f64> {
    match value {
        "N" => Some(0.85),
        "A" => Some(0.62),
        "L" => Some(0.55),
        "P" => Some(0.2),
        _ => None,
    }
}

fn attack_complexity(value: &str) -> Option<f64> {
    match value {
        "L" => Some(0.77),
        "H" => Some(0.44),
        _ => None,
    }
}

fn privileges_required(value: &str, scope_changed: bool) -> Option<f64> {
    match (value, scope_changed) {
        ("N", _) => Some(0.85),
        ("L", false) => Some(0.62),
        ("L", true) => Some(0.68),
        ("H", false) => Some(0.27),
        ("H", true) => Some(0.5),
        _ => None,
    }
}

fn user_interaction(value: &str) -> Option<f64> {
    match value {
        "N" => Some(0.85),
        "R" => Some(0.62),
        _ => None,
    }
}

fn impact(value: &str) -> Option<f64> {
    match value {
        "H" => Some(0.56),
        "L" => Some(0.22),
        "N" => Some(0.0),
        _ => None,
    }
}

/// CVSS v3.1 Roundup: smallest one-decimal number >= input, computed on
/// integers to avoid floating point drift.
fn round_up(value: f64) -> f64 {
    let scaled = (value * 100_000.0).round() as i64;
    if scaled % 10_000 == 0 {
        scaled as f64 / 100_000.0
    } else {
        ((scaled / 10_000) + 1) as f64 / 10.0
    }
}
