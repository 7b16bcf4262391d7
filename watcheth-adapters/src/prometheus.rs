//! Prometheus text exposition format parsing.
//!
//! Only what a scraper needs: sample names, labels and values. `# HELP` and
//! `# TYPE` lines are skipped; histograms are read through their `_sum` and
//! `_count` series.

use std::collections::BTreeMap;

use crate::AdapterError;

/// One sample line: `name{label="value",...} value [timestamp]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub name: String,
    pub labels: BTreeMap<String, String>,
    pub value: f64,
}

impl Sample {
    pub fn label(&self, name: &str) -> Option<&str> {
        self.labels.get(name).map(String::as_str)
    }
}

/// All samples from one scrape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricSet {
    samples: Vec<Sample>,
}

impl MetricSet {
    /// Parse a scrape body.
    pub fn parse(text: &str) -> Result<Self, AdapterError> {
        let mut samples = Vec::new();
        for (number, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let sample = parse_sample(line).ok_or_else(|| {
                AdapterError::Parse(format!("invalid metrics line {}: {line}", number + 1))
            })?;
            samples.push(sample);
        }
        Ok(Self { samples })
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Every sample of one series name.
    pub fn series<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Sample> + 'a {
        self.samples.iter().filter(move |s| s.name == name)
    }

    /// Value of the first sample with this name.
    pub fn value(&self, name: &str) -> Option<f64> {
        self.series(name).next().map(|s| s.value)
    }

    /// Value of the first sample with this name whose `label` equals `expected`.
    pub fn value_where(&self, name: &str, label: &str, expected: &str) -> Option<f64> {
        self.series(name)
            .find(|s| s.label(label) == Some(expected))
            .map(|s| s.value)
    }

    /// Summed `_sum` and `_count` over every series of a histogram or summary.
    ///
    /// Returns `None` when the metric is absent or has no observations.
    pub fn histogram_totals(&self, name: &str) -> Option<(f64, f64)> {
        let sum_name = format!("{name}_sum");
        let count_name = format!("{name}_count");
        let sum: f64 = self.series(&sum_name).map(|s| s.value).sum();
        let count: f64 = self.series(&count_name).map(|s| s.value).sum();
        (count > 0.0).then_some((sum, count))
    }

    /// Mean observation of a histogram or summary.
    pub fn histogram_mean(&self, name: &str) -> Option<f64> {
        self.histogram_totals(name).map(|(sum, count)| sum / count)
    }
}

fn parse_sample(line: &str) -> Option<Sample> {
    let name_end = line
        .find(|c: char| c == '{' || c.is_whitespace())
        .unwrap_or(line.len());
    let name = &line[..name_end];
    if name.is_empty() {
        return None;
    }

    let mut rest = &line[name_end..];
    let mut labels = BTreeMap::new();
    if let Some(body) = rest.strip_prefix('{') {
        let (parsed, after) = parse_labels(body)?;
        labels = parsed;
        rest = after;
    }

    // A trailing timestamp is allowed and ignored.
    let value = rest.split_whitespace().next()?;
    Some(Sample {
        name: name.to_string(),
        labels,
        value: parse_value(value)?,
    })
}

/// Parse `key="value",...}` and return the labels and whatever follows `}`.
fn parse_labels(mut input: &str) -> Option<(BTreeMap<String, String>, &str)> {
    let mut labels = BTreeMap::new();
    loop {
        input = input.trim_start();
        if let Some(after) = input.strip_prefix('}') {
            return Some((labels, after));
        }

        let eq = input.find('=')?;
        let key = input[..eq].trim();
        input = input[eq + 1..].trim_start().strip_prefix('"')?;

        let mut value = String::new();
        let mut chars = input.char_indices();
        let end = loop {
            let (i, c) = chars.next()?;
            match c {
                '"' => break i,
                '\\' => match chars.next()?.1 {
                    'n' => value.push('\n'),
                    other => value.push(other),
                },
                c => value.push(c),
            }
        };
        labels.insert(key.to_string(), value);

        input = input[end + 1..].trim_start();
        input = input.strip_prefix(',').unwrap_or(input);
    }
}

fn parse_value(text: &str) -> Option<f64> {
    match text {
        "+Inf" => Some(f64::INFINITY),
        "-Inf" => Some(f64::NEG_INFINITY),
        "NaN" => Some(f64::NAN),
        _ => text.parse().ok(),
    }
}
