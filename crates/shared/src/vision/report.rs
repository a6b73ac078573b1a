#[derive(Debug, Clone, Default, PartialEq)]
pub struct FoodReport {
    pub category: String,
    pub confidence: f32,
    pub analysis: String,
}

/// Reads the fixed `Category:` / `Confidence:` / `Analysis:` layout the vision prompt asks for.
///
/// `seed` carries the classifier's values; recognised lines override them. Everything after
/// `Analysis:` is collected line by line. Unexpected layouts never fail: unparsed fields keep
/// their seed value.
pub fn parse_food_report(text: &str, seed: FoodReport) -> FoodReport {
    let mut report = seed;
    let mut analysis_lines = Vec::new();
    let mut in_analysis = false;

    // Field markers only count at the start of a line; indented lines belong to the analysis.
    for line in text.lines() {
        if let Some(value) = line.strip_prefix("Category:") {
            report.category = value.trim().to_string();
        } else if let Some(value) = line.strip_prefix("Confidence:") {
            if let Some(confidence) = parse_confidence(value) {
                report.confidence = confidence;
            }
        } else if let Some(rest) = line.strip_prefix("Analysis:") {
            in_analysis = true;
            let inline = rest.trim();
            if !inline.is_empty() {
                analysis_lines.push(inline.to_string());
            }
        } else if in_analysis {
            analysis_lines.push(line.trim().to_string());
        }
    }

    if in_analysis {
        report.analysis = analysis_lines.join("\n");
    }
    report
}

fn parse_confidence(raw: &str) -> Option<f32> {
    raw.trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .map(|value| value.clamp(0.0, 100.0))
}
