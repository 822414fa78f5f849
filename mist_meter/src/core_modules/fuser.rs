// THEORY:
// The fuser folds the threshold rule and the classifier into one decision.
// An alert goes out when any of these hold:
// - the threshold rule fired;
// - the classifier labels the scene as mist;
// - the classifier is unsure of its own label (probability under the
//   certainty floor). This asks a human to look; it does not claim fog.
//
// Fusing is pure: the same inputs always give the same decision and the same
// message text.

/// The outcome of one run. Only its fields are recorded, never the struct.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub rule_triggered: bool,
    /// `None` when the classifier could not run.
    pub predicted_label: Option<bool>,
    pub probability: Option<f64>,
    pub should_alert: bool,
    pub message: String,
}

pub fn fuse(rule_triggered: bool, label: bool, probability: f64, certainty_floor: f64) -> Decision {
    let uncertain = probability < certainty_floor;
    let should_alert = rule_triggered || label || uncertain;

    let mut parts = Vec::with_capacity(2);
    if rule_triggered {
        parts.push(rule_message());
    }
    if label {
        parts.push(format!("classifier predicts mist with probability {probability:.2}"));
    } else if uncertain {
        parts.push(format!(
            "classifier predicts no mist, but only with probability {probability:.2}; please check the image"
        ));
    } else if rule_triggered {
        parts.push(format!("classifier predicts no mist with probability {probability:.2}"));
    }

    let message = if parts.is_empty() {
        format!("No mist: classifier predicts no mist with probability {probability:.2}")
    } else {
        capitalize(&parts.join("; "))
    };

    Decision {
        rule_triggered,
        predicted_label: Some(label),
        probability: Some(probability),
        should_alert,
        message,
    }
}

/// The decision when only the threshold rule is available.
pub fn rule_only(rule_triggered: bool) -> Decision {
    let message = if rule_triggered {
        capitalize(&format!("{} (classifier unavailable)", rule_message()))
    } else {
        "No mist by threshold rule (classifier unavailable)".to_string()
    };
    Decision {
        rule_triggered,
        predicted_label: None,
        probability: None,
        should_alert: rule_triggered,
        message,
    }
}

fn rule_message() -> String {
    "threshold rule triggered: scene is lit and blur is at or below the fog threshold".to_string()
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
