// Copyright 2024 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt;
use std::io::{self, Stderr, StderrLock, Stdout, StdoutLock, Write};

/// Writer that prints `heading` before the first chunk of output.
pub struct HeadingWriter<W, H> {
    output: W,
    heading: Option<H>,
}

impl<W: Write, H: fmt::Display> HeadingWriter<W, H> {
    fn new(output: W, heading: H) -> Self {
        HeadingWriter {
            output,
            heading: Some(heading),
        }
    }
}

impl<W: Write, H: fmt::Display> Write for HeadingWriter<W, H> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(heading) = self.heading.take() {
            write!(self.output, "{heading}")?;
        }
        self.output.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.output.flush()
    }
}

/// Terminal output of one command invocation.
pub struct Ui {
    quiet: bool,
    stdout: Stdout,
    stderr: Stderr,
}

impl Default for Ui {
    fn default() -> Self {
        Self::new()
    }
}

impl Ui {
    pub fn new() -> Self {
        Ui {
            quiet: false,
            stdout: io::stdout(),
            stderr: io::stderr(),
        }
    }

    pub fn set_quiet(&mut self, quiet: bool) {
        self.quiet = quiet;
    }

    /// Locked stdout for the command's main output.
    pub fn stdout(&self) -> StdoutLock<'static> {
        self.stdout.lock()
    }

    pub fn stderr(&self) -> StderrLock<'static> {
        self.stderr.lock()
    }

    /// Writer to print an update that's not part of the command's main output.
    /// Discards everything if `--quiet` was requested.
    pub fn status(&self) -> Box<dyn Write> {
        if self.quiet {
            Box::new(io::sink())
        } else {
            Box::new(self.stderr())
        }
    }

    /// Writer to print hint with the default "Hint: " heading.
    pub fn hint_default(&self) -> HeadingWriter<Box<dyn Write>, &'static str> {
        self.hint_with_heading("Hint: ")
    }

    pub fn hint_with_heading<H: fmt::Display>(
        &self,
        heading: H,
    ) -> HeadingWriter<Box<dyn Write>, H> {
        HeadingWriter::new(self.status(), heading)
    }

    /// Writer to print warning with the default "Warning: " heading.
    pub fn warning_default(&self) -> HeadingWriter<StderrLock<'static>, &'static str> {
        HeadingWriter::new(self.stderr(), "Warning: ")
    }

    pub fn error_with_heading<H: fmt::Display>(
        &self,
        heading: H,
    ) -> HeadingWriter<StderrLock<'static>, H> {
        HeadingWriter::new(self.stderr(), heading)
    }
}
