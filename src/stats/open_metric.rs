//! A tiny metrics-export seam: a trait exposing named measurements, decoupled
//! from any particular wire format. The external metrics surface (out of
//! scope here) renders these however it needs to.

/// One exported metric family.
pub trait OpenMetric: Send + Sync {
    fn name(&self) -> &str;
    fn help(&self) -> &str;
    fn measurements(&self) -> Vec<Measurement>;
}

/// A single metric value, optionally labeled.
#[derive(Debug, Clone)]
pub struct Measurement {
    pub labels: Vec<(String, String)>,
    pub value: f64,
}

impl Measurement {
    pub fn unlabeled(value: f64) -> Self {
        Self {
            labels: Vec::new(),
            value,
        }
    }

    pub fn render(&self, name: &str) -> String {
        if self.labels.is_empty() {
            format!("{} {}", name, self.value)
        } else {
            let labels = self
                .labels
                .iter()
                .map(|(k, v)| format!("{}=\"{}\"", k, v))
                .collect::<Vec<_>>()
                .join(",");
            format!("{}{{{}}} {}", name, labels, self.value)
        }
    }
}
