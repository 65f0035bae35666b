/// Output sink for machine traces, so the VM stays independent of the process streams.
pub trait RuntimeIo {
    fn write(&mut self, s: &str);

    fn write_line(&mut self, s: &str) {
        self.write(s);
        self.write("\n");
    }
}

/// Default I/O that writes to process stdout (CLI use).
pub struct StdIo;

impl RuntimeIo for StdIo {
    fn write_line(&mut self, s: &str) {
        println!("{}", s);
    }

    fn write(&mut self, s: &str) {
        use std::io::Write;
        print!("{}", s);
        let _ = std::io::stdout().flush();
    }
}

/// Buffer-based I/O for tests and the REPL: output accumulates in memory.
#[derive(Debug, Default)]
pub struct BufferIo {
    output: String,
}

impl BufferIo {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn get_output(&self) -> &str {
        &self.output
    }

    /// Returns what was written since the last drain.
    pub fn drain_output(&mut self) -> String {
        std::mem::take(&mut self.output)
    }
}

impl RuntimeIo for BufferIo {
    fn write(&mut self, s: &str) {
        self.output.push_str(s);
    }
}
