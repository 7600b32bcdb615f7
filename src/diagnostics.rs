//! Read-only queries over the parameters and buffers of a model.

use std::io::{self, Write};

use nn::Module;

const RULE_WIDTH: usize = 60;

/// A parameter as it shows up in the report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterEntry {
    pub name: String,
    pub numel: usize,
    pub trainable: bool,
}

/// Layer-wise parameter counts of a model along with their totals.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParameterReport {
    pub entries: Vec<ParameterEntry>,
    pub total: usize,
    pub trainable: usize,
}

impl ParameterReport {
    pub fn collect<M: Module + ?Sized>(model: &M) -> Self {
        let entries: Vec<_> = model
            .named_parameters()
            .into_iter()
            .map(|(name, param)| ParameterEntry {
                name,
                numel: param.numel(),
                trainable: param.requires_grad(),
            })
            .collect();

        let total = entries.iter().map(|e| e.numel).sum();
        let trainable = entries
            .iter()
            .filter(|e| e.trainable)
            .map(|e| e.numel)
            .sum();

        Self {
            entries,
            total,
            trainable,
        }
    }

    pub fn frozen(&self) -> usize {
        self.total - self.trainable
    }

    /// Writes the report in a human readable form.
    pub fn write_to<W: Write + ?Sized>(&self, out: &mut W) -> io::Result<()> {
        let rule = "-".repeat(RULE_WIDTH);

        writeln!(out, "Layer-wise parameter count:")?;
        writeln!(out, "{rule}")?;

        for entry in &self.entries {
            let status = if entry.trainable { "trainable" } else { "frozen" };
            writeln!(out, "{}: {} ({status})", entry.name, separated(entry.numel))?;
        }

        writeln!(out, "{rule}")?;
        writeln!(out, "Total parameters: {}", separated(self.total))?;
        writeln!(out, "Trainable parameters: {}", separated(self.trainable))?;
        writeln!(out, "Non-trainable parameters: {}", separated(self.frozen()))
    }
}

/// Prints every named parameter of `model` with its element count and
/// whether it is trainable, followed by the totals.
pub fn report_parameters<M, W>(model: &M, out: &mut W) -> io::Result<()>
where
    M: Module + ?Sized,
    W: Write + ?Sized,
{
    ParameterReport::collect(model).write_to(out)
}

/// Returns the amount of scalar parameters that would receive gradient updates.
pub fn count_trainable_parameters<M: Module + ?Sized>(model: &M) -> usize {
    model
        .named_parameters()
        .into_iter()
        .filter(|(_, param)| param.requires_grad())
        .map(|(_, param)| param.numel())
        .sum()
}

/// Prints the trainable parameter count of `model` with thousands separators.
pub fn write_trainable_total<M, W>(model: &M, out: &mut W) -> io::Result<()>
where
    M: Module + ?Sized,
    W: Write + ?Sized,
{
    writeln!(
        out,
        "Total trainable parameters: {}",
        separated(count_trainable_parameters(model))
    )
}

/// Storage used by the tensors of a model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelSize {
    pub param_bytes: usize,
    pub buffer_bytes: usize,
}

impl ModelSize {
    pub fn of<M: Module + ?Sized>(model: &M) -> Self {
        let param_bytes = model
            .named_parameters()
            .into_iter()
            .map(|(_, param)| param.nbytes())
            .sum();
        let buffer_bytes = model
            .named_buffers()
            .into_iter()
            .map(|(_, buffer)| buffer.nbytes())
            .sum();

        Self {
            param_bytes,
            buffer_bytes,
        }
    }

    pub fn total_bytes(&self) -> usize {
        self.param_bytes + self.buffer_bytes
    }

    pub fn mebibytes(&self) -> f64 {
        self.total_bytes() as f64 / 1024. / 1024.
    }
}

/// Returns the storage of every parameter and buffer of `model` in mebibytes.
pub fn estimate_model_size_bytes<M: Module + ?Sized>(model: &M) -> f64 {
    ModelSize::of(model).mebibytes()
}

/// Formats `n` with a comma every three digits.
pub fn separated(n: usize) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);

    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }

    out
}
