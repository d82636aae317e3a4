use parking_lot::Mutex;

/// Destination for one report's worth of formatted lines.
pub trait ReportSink: Send + Sync + 'static {
    fn emit(&self, lines: &[String]);
}

/// Prints each report line to stdout.
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn emit(&self, lines: &[String]) {
        for line in lines {
            println!("{}", line);
        }
    }
}

/// Captures whole reports in memory for assertions.
#[derive(Default)]
pub struct MemorySink {
    reports: Mutex<Vec<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> MemorySink {
        MemorySink::default()
    }

    pub fn reports(&self) -> Vec<Vec<String>> {
        self.reports.lock().clone()
    }

    pub fn last_report(&self) -> Option<Vec<String>> {
        self.reports.lock().last().cloned()
    }

    pub fn report_count(&self) -> usize {
        self.reports.lock().len()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ReportSink for MemorySink {
    fn emit(&self, lines: &[String]) {
        self.reports.lock().push(lines.to_vec());
    }
}
