use super::dictionary::Dictionary;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
struct LabelCounts {
    num_match: u64,
    num_model: u64,
    num_reference: u64,
    precision: f64,
    recall: f64,
    f1: f64,
}

/// Tagging accuracy of a holdout set
#[derive(Debug, Clone, Default)]
pub(crate) struct Evaluation {
    labels: Vec<LabelCounts>,
    item_correct: u64,
    item_total: u64,
    instance_correct: u64,
    instance_total: u64,
    macro_precision: f64,
    macro_recall: f64,
    macro_f1: f64,
}

impl Evaluation {
    pub fn new(num_labels: usize) -> Self {
        Self {
            labels: vec![LabelCounts::default(); num_labels],
            ..Default::default()
        }
    }

    /// Count one instance given its reference and predicted label paths.
    pub fn accumulate(&mut self, reference: &[u32], prediction: &[u32]) {
        let mut matched = 0;
        for (&r, &p) in reference.iter().zip(prediction) {
            self.labels[r as usize].num_reference += 1;
            self.labels[p as usize].num_model += 1;
            if r == p {
                self.labels[r as usize].num_match += 1;
                matched += 1;
            }
        }
        self.item_correct += matched;
        self.item_total += reference.len() as u64;
        if matched == reference.len() as u64 {
            self.instance_correct += 1;
        }
        self.instance_total += 1;
    }

    /// Compute the per-label scores and their macro averages.
    pub fn finalize(&mut self) {
        let mut n = 0u32;
        let (mut p_sum, mut r_sum, mut f_sum) = (0.0, 0.0, 0.0);
        for counts in &mut self.labels {
            if counts.num_reference == 0 {
                continue;
            }
            n += 1;
            counts.precision = if counts.num_model > 0 {
                counts.num_match as f64 / counts.num_model as f64
            } else {
                0.0
            };
            counts.recall = counts.num_match as f64 / counts.num_reference as f64;
            counts.f1 = if counts.precision + counts.recall > 0.0 {
                2.0 * counts.precision * counts.recall / (counts.precision + counts.recall)
            } else {
                0.0
            };
            p_sum += counts.precision;
            r_sum += counts.recall;
            f_sum += counts.f1;
        }
        if n > 0 {
            let n = f64::from(n);
            self.macro_precision = p_sum / n;
            self.macro_recall = r_sum / n;
            self.macro_f1 = f_sum / n;
        }
    }

    pub fn item_accuracy(&self) -> f64 {
        ratio(self.item_correct, self.item_total)
    }

    pub fn instance_accuracy(&self) -> f64 {
        ratio(self.instance_correct, self.instance_total)
    }

    /// Report lines, in order
    pub fn report(&self, names: &Dictionary) -> Vec<String> {
        let mut lines =
            vec!["Performance by label (#match, #model, #ref) (precision, recall, F1):\n".to_string()];
        for (id, counts) in self.labels.iter().enumerate() {
            let name = names.get_name(id as u32).unwrap_or("[UNKNOWN]");
            let line = if counts.num_reference == 0 {
                format!(
                    "    {}: ({}, {}, {}) (******, ******, ******)\n",
                    name, counts.num_match, counts.num_model, counts.num_reference
                )
            } else {
                format!(
                    "    {}: ({}, {}, {}) ({:.4}, {:.4}, {:.4})\n",
                    name,
                    counts.num_match,
                    counts.num_model,
                    counts.num_reference,
                    counts.precision,
                    counts.recall,
                    counts.f1
                )
            };
            lines.push(line);
        }
        lines.push(format!(
            "Macro-average precision, recall, F1: ({:.6}, {:.6}, {:.6})\n",
            self.macro_precision, self.macro_recall, self.macro_f1
        ));
        lines.push(format!(
            "Item accuracy: {} / {} ({:.4})\n",
            self.item_correct,
            self.item_total,
            self.item_accuracy()
        ));
        lines.push(format!(
            "Instance accuracy: {} / {} ({:.4})\n",
            self.instance_correct,
            self.instance_total,
            self.instance_accuracy()
        ));
        lines
    }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}
