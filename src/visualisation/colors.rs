//! Colors per data role

pub const TRAIN_COLOR: &str = "lightsteelblue";
pub const VALID_COLOR: &str = "steelblue";
pub const TEST_COLOR: &str = "navy";
pub const BASELINE_COLOR: &str = "lightgray";

/// Color for a data role; unknown roles fall back to gray
pub fn role_color(role: &str) -> &'static str {
    match role {
        "train" => TRAIN_COLOR,
        "valid" | "validation" => VALID_COLOR,
        "test" => TEST_COLOR,
        "baseline" => BASELINE_COLOR,
        _ => "gray",
    }
}

const LOW: (f64, f64, f64) = (0.0, 138.0, 250.0);
const HIGH: (f64, f64, f64) = (255.0, 0.0, 82.0);

/// Blue-to-red color for an intensity in [0, 1]
pub fn gradient(t: f64) -> String {
    let t = if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 };
    let mix = |a: f64, b: f64| (a + (b - a) * t).round() as u8;
    format!(
        "#{:02x}{:02x}{:02x}",
        mix(LOW.0, HIGH.0),
        mix(LOW.1, HIGH.1),
        mix(LOW.2, HIGH.2)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gradient_endpoints() {
        assert_eq!(gradient(0.0), "#008afa");
        assert_eq!(gradient(1.0), "#ff0052");
        assert_eq!(gradient(f64::NAN), gradient(0.5));
        assert_eq!(role_color("test"), "navy");
    }
}
