//! Multi-turn chat over a windowed conversation history

use crate::config::GenerationSettings;
use crate::error::Result;
use crate::runtime::RuntimeEngine;
use std::io::{BufRead, Write};

pub const DEFAULT_HISTORY_WINDOW: usize = 5;
pub const USER_LABEL: &str = "User";

/// Conversation state bound to an engine
pub struct ChatSession<E> {
    engine: E,
    params: GenerationSettings,
    history: Vec<String>,
    window: usize,
}

impl<E: RuntimeEngine> ChatSession<E> {
    pub fn new(engine: E, params: GenerationSettings) -> Self {
        Self {
            engine,
            params,
            history: Vec::new(),
            window: DEFAULT_HISTORY_WINDOW,
        }
    }

    /// Number of trailing history entries used for the prompt (minimum 1)
    pub fn with_window(mut self, window: usize) -> Self {
        self.window = window.max(1);
        self
    }

    pub fn history(&self) -> &[String] {
        &self.history
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Join the last `window` history entries with newlines
    pub fn build_prompt(&self) -> String {
        let start = self.history.len().saturating_sub(self.window);
        self.history[start..].join("\n")
    }

    /// Run one exchange: record the user text, generate, record the answer.
    pub fn turn(&mut self, user_text: &str) -> Result<String> {
        self.history.push(user_text.to_string());
        let prompt = self.build_prompt();
        tracing::debug!("Prompt built from {} history entries", self.history.len().min(self.window));

        let result = self.engine.generate(&prompt, &self.params)?;
        let answer = clean_answer(&result.text, &prompt);
        self.history.push(answer.clone());
        Ok(answer)
    }
}

/// Remove echoes of the prompt and every newline from raw model output
pub fn clean_answer(raw: &str, prompt: &str) -> String {
    let stripped = if prompt.is_empty() {
        raw.to_string()
    } else {
        raw.replace(prompt, "")
    };
    stripped.replace('\n', "")
}

/// Read-eval-print loop: `User: ` prompt in, `<speaker>: <answer>` out.
///
/// Runs until `input` reaches end of file. Any generation fault ends the
/// loop with that error. Returns the number of completed turns.
pub fn run_repl<E, R, W>(session: &mut ChatSession<E>, speaker: &str, mut input: R, mut output: W) -> Result<usize>
where
    E: RuntimeEngine,
    R: BufRead,
    W: Write,
{
    let mut turns = 0;
    loop {
        write!(output, "{USER_LABEL}: ")?;
        output.flush()?;

        let mut line = String::new();
        if input.read_line(&mut line)? == 0 {
            writeln!(output)?;
            break;
        }
        let text = line.trim_end_matches(['\r', '\n']);

        let answer = session.turn(text)?;
        writeln!(output, "{speaker}: {answer}")?;
        output.flush()?;
        turns += 1;
    }
    tracing::info!("Chat ended after {} turns", turns);
    Ok(turns)
}
