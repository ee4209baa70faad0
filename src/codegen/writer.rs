//! Indented source writer.

/// Line-oriented writer that tracks brace depth.
#[derive(Debug, Clone)]
pub struct CodeWriter {
    buf: String,
    depth: usize,
    indent: String,
}

impl CodeWriter {
    pub fn new(indent_size: usize) -> Self {
        Self {
            buf: String::new(),
            depth: 0,
            indent: " ".repeat(indent_size),
        }
    }

    /// Write one line at the current depth. Empty input writes a bare newline.
    pub fn line(&mut self, text: impl AsRef<str>) {
        let text = text.as_ref();
        if !text.is_empty() {
            for _ in 0..self.depth {
                self.buf.push_str(&self.indent);
            }
            self.buf.push_str(text);
        }
        self.buf.push('\n');
    }

    pub fn blank(&mut self) {
        self.line("");
    }

    /// Write `header`, then an opening brace, and indent.
    pub fn open(&mut self, header: impl AsRef<str>) {
        self.line(header);
        self.line("{");
        self.depth += 1;
    }

    /// Open a bare `{ }` scope.
    pub fn open_block(&mut self) {
        self.line("{");
        self.depth += 1;
    }

    pub fn close(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        self.line("}");
    }

    /// Close the current block and open an `else` block.
    pub fn else_open(&mut self) {
        self.close();
        self.line("else");
        self.line("{");
        self.depth += 1;
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

impl Default for CodeWriter {
    fn default() -> Self {
        Self::new(4)
    }
}
