use anyhow::Result;
use cairo_prof::{DoctorReport, ExitOutcome, RunReport};

pub struct CliLogger {
    json: bool,
    no_color: bool,
}

impl CliLogger {
    pub fn new(json: bool, no_color: bool) -> Self {
        Self { json, no_color }
    }

    pub fn print_run_report(&self, report: &RunReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(report)?);
            return Ok(());
        }

        let outcome = match report.outcome {
            ExitOutcome::Success => self.style("OK", "32;1"),
            ExitOutcome::ArgumentError => self.style("INVALID", "33;1"),
            ExitOutcome::ToolMissing => self.style("MISSING TOOL", "33;1"),
            _ => self.style("FAIL", "31;1"),
        };

        let mut out = String::new();
        let metric = report.metric.map(|m| m.as_str()).unwrap_or("-");
        out.push_str(&format!(
            "{} {} {} {}\n",
            self.style("cairo-prof", "36;1"),
            self.style(metric, "37;1"),
            outcome,
            self.style(&format!("(exit {})", report.code), "90")
        ));
        if let Some(key) = &report.key {
            out.push_str(&format!("{} {key}\n", self.style("key", "90")));
        }
        if let Some(path) = &report.trace_path {
            out.push_str(&format!("{} {}\n", self.style("trace", "90"), path.display()));
        }
        if let Some(path) = &report.profile_path {
            out.push_str(&format!("{} {}\n", self.style("profile", "90"), path.display()));
        }
        if let Some(path) = &report.graph_path {
            out.push_str(&format!("{} {}\n", self.style("graph", "90"), path.display()));
        }
        if !report.samples.is_empty() {
            out.push_str(&format!(
                "{} {}\n",
                self.style("samples", "90"),
                report.samples.join(", ")
            ));
        }
        if let Some(summary) = &report.resource_summary {
            out.push_str(&format!("{}\n", self.style("resources", "90")));
            for line in summary.lines() {
                out.push_str(&format!("  {}\n", line.trim()));
            }
        }
        if let Some(err) = &report.error {
            out.push_str(&format!("{} {err}\n", self.style("error", "31;1")));
        }
        if let Some(tail) = &report.stderr_tail {
            out.push_str(&format!("{}\n", self.style("stderr", "90")));
            for line in tail.lines() {
                out.push_str(&format!("  | {line}\n"));
            }
        }

        println!("{}", out.trim_end());
        Ok(())
    }

    pub fn print_doctor(&self, report: &DoctorReport) -> Result<()> {
        if self.json {
            println!("{}", serde_json::to_string(report)?);
            return Ok(());
        }

        let mut out = String::new();
        for check in &report.tools {
            let mark = match (&check.resolved, check.required) {
                (Some(_), _) => self.style("ok", "32;1"),
                (None, true) => self.style("missing", "31;1"),
                (None, false) => self.style("absent", "33"),
            };
            let location = check
                .resolved
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| check.program.clone());
            out.push_str(&format!(
                "{:<8} {} {}\n",
                mark,
                self.style(&check.name, "37;1"),
                location
            ));
        }
        let verdict = if report.ok {
            self.style("ready", "32;1")
        } else {
            self.style("not ready", "31;1")
        };
        out.push_str(&format!("{} {verdict}\n", self.style("doctor", "36;1")));
        println!("{}", out.trim_end());
        Ok(())
    }

    pub fn print_error(&self, msg: &str) {
        if self.json {
            let out = serde_json::json!({
                "outcome": ExitOutcome::ArgumentError,
                "code": ExitOutcome::ArgumentError.code(),
                "error": msg,
            });
            println!("{out}");
            return;
        }
        eprintln!("{} {msg}", self.style("error", "31;1"));
    }

    fn style(&self, text: &str, ansi: &str) -> String {
        if self.no_color {
            return text.to_string();
        }
        format!("\x1b[{ansi}m{text}\x1b[0m")
    }
}
