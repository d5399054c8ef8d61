/// Weighted topic keywords. A text mentioning keywords worth 10 or more in
/// total scores 1.0.
const TOPIC_KEYWORDS: &[(&str, f64)] = &[
    ("time series", 3.0),
    ("temporal analysis", 2.5),
    ("forecasting", 2.0),
    ("arima", 2.0),
    ("garch", 2.0),
    ("stochastic process", 2.0),
    ("econometrics", 1.5),
    ("signal processing", 1.5),
    ("time domain", 1.5),
    ("frequency domain", 1.5),
    ("seasonal", 1.0),
    ("trend", 0.8),
    ("correlation", 0.5),
    ("regression", 0.3),
];

/// Time-series topic relevance of a title and abstract, in `[0, 1]`.
pub fn relevance(title: &str, abstract_text: Option<&str>) -> f64 {
    let text = format!("{title} {}", abstract_text.unwrap_or_default()).to_lowercase();
    let score: f64 = TOPIC_KEYWORDS
        .iter()
        .filter(|(keyword, _)| text.contains(keyword))
        .map(|(_, weight)| weight)
        .sum();
    (score / 10.0).min(1.0)
}
