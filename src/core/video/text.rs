use crate::core::ocr::TextSpan;

/// 按场景顺序拼接所有关键帧识别到的文字，每个片段后面跟一个分隔符
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccumulatedText {
    delimiter: String,
    buffer: String,
    spans: usize,
}

impl AccumulatedText {
    pub fn new(delimiter: impl Into<String>) -> Self {
        Self {
            delimiter: delimiter.into(),
            buffer: String::new(),
            spans: 0,
        }
    }

    pub fn push_spans(&mut self, spans: &[TextSpan]) {
        for span in spans {
            self.buffer.push_str(&span.text);
            self.buffer.push_str(&self.delimiter);
            self.spans += 1;
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buffer
    }

    pub fn span_count(&self) -> usize {
        self.spans
    }

    pub fn is_empty(&self) -> bool {
        self.spans == 0
    }

    pub fn into_string(self) -> String {
        self.buffer
    }
}

impl Default for AccumulatedText {
    fn default() -> Self {
        Self::new("\n")
    }
}
