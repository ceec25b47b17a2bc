//! Incremental decoder
//!
//! [`Generator`] produces one row per pull. For every row it asks the oracle
//! to scan the committed history once, then samples the row one sub-token at
//! a time: an event type (or end-of-stream) first, then each declared
//! parameter of that event, each draw masked to the grammar. A row becomes
//! visible in [`Generator::rows`] only once it is complete, so a caller that
//! stops pulling mid-run keeps every row already emitted.

use crate::{
    codec::{Event, EventCodec, Row, TimeCursor},
    grammar::{EventSchema, Registry, Symbol, BOS_ID, EOS_ID, PAD_ID},
    mask::{MaskPolicy, Slot},
    oracle::ScoringOracle,
    sampling::{Sampler, SamplingParams},
    CoreError, Result,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// Configuration for one generation run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Maximum number of rows to generate (prompt rows not counted)
    pub max_rows: usize,

    /// Temperature for sampling; must be positive
    pub temperature: f32,

    /// Top-p (nucleus) sampling threshold
    pub top_p: f32,

    /// Top-k sampling parameter
    pub top_k: usize,

    /// Whether instrument-changing events may be sampled
    pub allow_patch_change: bool,

    /// Maximum number of prompt rows honored
    pub max_prompt_rows: usize,

    /// Random seed for reproducible generation
    pub seed: Option<u64>,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_rows: 512,
            temperature: 1.0,
            top_p: 0.98,
            top_k: 20,
            allow_patch_change: true,
            max_prompt_rows: 128,
            seed: None,
        }
    }
}

impl GenerationConfig {
    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            temperature: self.temperature,
            top_p: self.top_p,
            top_k: self.top_k,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.sampling().validate()
    }

    /// Load and validate a configuration from a TOML file
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CoreError::io_at(e, path))?;

        let config: Self = toml::from_str(&content).map_err(|e| CoreError::Configuration {
            code: "CONFIG_PARSE_ERROR",
            message: format!("Failed to parse generation config: {}", e),
            context: "Loading generation configuration".to_string(),
            suggestion: "Check the TOML syntax and field names".to_string(),
            config_path: Some(path.to_path_buf()),
        })?;

        config.validate()?;
        Ok(config)
    }
}

/// Reason why generation stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    /// End-of-stream sampled at position 0
    EndOfStream,

    /// Reached max_rows
    MaxRows,

    /// Oracle failure or policy violation
    Error,
}

impl std::fmt::Display for FinishReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FinishReason::EndOfStream => "end_of_stream",
            FinishReason::MaxRows => "max_rows",
            FinishReason::Error => "error",
        };
        f.write_str(name)
    }
}

/// Where the decoder is within a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeState {
    /// Primed, nothing pulled yet
    AwaitingContext,
    /// Scanning history for the next row
    ScoringRow,
    /// Sampling the sub-token at this row position
    SamplingSubtoken(usize),
    /// Last row finished and committed
    RowComplete,
    StreamTerminal(FinishReason),
}

/// Counters for one run
#[derive(Debug, Clone, Default, Serialize)]
pub struct GenerationStats {
    /// Rows emitted (prompt excluded)
    pub rows_generated: usize,

    /// Full-history oracle calls
    pub history_scans: usize,

    /// Per-sub-token oracle calls
    pub extensions: usize,

    /// Wall time spent inside pulls
    pub elapsed: Duration,
}

impl GenerationStats {
    pub fn rows_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.rows_generated as f64 / secs
        } else {
            0.0
        }
    }
}

/// One completed row handed to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmittedRow<E> {
    pub row: Row,
    pub event: Event<E>,
    /// Absolute time of the event, in sub-ticks
    pub time: u64,
}

/// In-flight row; dropped unless the row completes
struct DecodingCursor<E> {
    symbols: Vec<Symbol>,
    event: Option<E>,
}

impl<E: EventSchema> DecodingCursor<E> {
    fn new(width: usize) -> Self {
        Self {
            symbols: Vec::with_capacity(width),
            event: None,
        }
    }

    fn position(&self) -> usize {
        self.symbols.len()
    }

    fn is_complete(&self) -> bool {
        self.event
            .map(|event| self.symbols.len() == 1 + event.params().len())
            .unwrap_or(false)
    }
}

/// Lazy, finite row generator
pub struct Generator<'r, E: EventSchema, O: ScoringOracle> {
    registry: &'r Registry<E>,
    codec: EventCodec<'r, E>,
    mask: MaskPolicy<'r, E>,
    oracle: O,
    sampler: Sampler,
    sampling: SamplingParams,
    rows: Vec<Row>,
    prompt_len: usize,
    limit: usize,
    clock: TimeCursor,
    state: DecodeState,
    stats: GenerationStats,
}

impl<'r, E: EventSchema, O: ScoringOracle> Generator<'r, E, O> {
    /// Start from an empty history
    pub fn new(registry: &'r Registry<E>, oracle: O, config: &GenerationConfig) -> Result<Self> {
        Self::with_prompt(registry, oracle, config, Vec::new())
    }

    /// Start from already-committed prompt rows.
    ///
    /// Prompt rows are normalized to the row width, cut to
    /// `max_prompt_rows`, stripped of trailing end rows and given a leading
    /// begin row if they lack one. They are never re-sampled; they are only
    /// decoded to seed the running time.
    pub fn with_prompt(
        registry: &'r Registry<E>,
        oracle: O,
        config: &GenerationConfig,
        prompt: Vec<Row>,
    ) -> Result<Self> {
        config.validate()?;

        let codec = EventCodec::new(registry);
        let rows = normalize_prompt(registry, prompt, config.max_prompt_rows);

        let mut clock = TimeCursor::new();
        for event in rows.iter().filter_map(|row| codec.decode(row)) {
            clock.advance(&event);
        }

        let prompt_len = rows.len();
        debug!(
            "Starting generation: prompt rows {}, max rows {}, temperature {}, top_p {}, top_k {}, patch change {}",
            prompt_len,
            config.max_rows,
            config.temperature,
            config.top_p,
            config.top_k,
            config.allow_patch_change
        );

        Ok(Self {
            registry,
            codec,
            mask: MaskPolicy::new(registry, config.allow_patch_change),
            oracle,
            sampler: Sampler::new(config.seed),
            sampling: config.sampling(),
            rows,
            prompt_len,
            limit: prompt_len + config.max_rows,
            clock,
            state: DecodeState::AwaitingContext,
            stats: GenerationStats::default(),
        })
    }

    pub fn registry(&self) -> &'r Registry<E> {
        self.registry
    }

    pub fn state(&self) -> DecodeState {
        self.state
    }

    /// Set once the run has ended
    pub fn finish_reason(&self) -> Option<FinishReason> {
        match self.state {
            DecodeState::StreamTerminal(reason) => Some(reason),
            _ => None,
        }
    }

    /// Every committed row, prompt included
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Rows emitted by this run
    pub fn generated(&self) -> &[Row] {
        &self.rows[self.prompt_len..]
    }

    pub fn prompt_len(&self) -> usize {
        self.prompt_len
    }

    /// Absolute time of the latest committed event, in sub-ticks
    pub fn current_time(&self) -> u64 {
        self.clock.now()
    }

    pub fn stats(&self) -> &GenerationStats {
        &self.stats
    }

    /// Hand the committed rows to the caller
    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }

    /// Pull until the run ends.
    ///
    /// On error the committed rows stay available through [`Generator::rows`].
    pub fn run(&mut self) -> Result<FinishReason> {
        for item in self.by_ref() {
            item?;
        }
        Ok(self.finish_reason().unwrap_or(FinishReason::MaxRows))
    }

    fn terminate(&mut self, reason: FinishReason) {
        self.state = DecodeState::StreamTerminal(reason);
        info!(
            "Generation finished ({:?}): {} rows generated, {} history scans, {} extensions",
            reason, self.stats.rows_generated, self.stats.history_scans, self.stats.extensions
        );
    }

    /// Sample one row. `None` means end-of-stream was drawn at position 0.
    fn decode_row(&mut self) -> Result<Option<(Row, Event<E>)>> {
        self.state = DecodeState::ScoringRow;
        let context = self
            .oracle
            .score_history(&self.rows)
            .map_err(|e| CoreError::oracle("Scoring committed history", e))?;
        self.stats.history_scans += 1;

        let width = self.registry.row_width();
        let mut cursor = DecodingCursor::<E>::new(width);
        loop {
            let position = cursor.position();
            self.state = DecodeState::SamplingSubtoken(position);

            let legal = self.mask.legal_symbols(Slot::at(position, cursor.event)?)?;
            let logits = self
                .oracle
                .extend(&context, &cursor.symbols)
                .map_err(|e| CoreError::oracle(format!("Scoring row position {}", position), e))?;
            self.stats.extensions += 1;

            if logits.len() != self.registry.vocab_size() {
                return Err(CoreError::Oracle {
                    code: "ORACLE_VOCAB_MISMATCH",
                    message: format!(
                        "Oracle returned {} scores for a vocabulary of {}",
                        logits.len(),
                        self.registry.vocab_size()
                    ),
                    context: format!("Scoring row position {}", position),
                    source: None,
                });
            }

            let symbol = self.sampler.sample(&logits, &legal, &self.sampling)?;
            trace!("Sampled symbol {} at position {}", symbol, position);

            if position == 0 {
                if symbol == EOS_ID {
                    return Ok(None);
                }
                let event = self.registry.event_of(symbol).ok_or_else(|| {
                    CoreError::policy(
                        "MASK_ADMITTED_NON_EVENT",
                        format!("Symbol {} sampled at position 0 is not an event type", symbol),
                        "Sampling event type",
                        "Registry and masking policy have diverged",
                    )
                })?;
                cursor.event = Some(event);
            }

            cursor.symbols.push(symbol);
            if cursor.is_complete() {
                break;
            }
        }

        let mut symbols = cursor.symbols;
        symbols.resize(width, PAD_ID);
        let row = Row::new(symbols);

        let event = self.codec.decode(&row).ok_or_else(|| {
            CoreError::policy(
                "GENERATED_ROW_UNDECODABLE",
                format!("Generated row {:?} does not decode", row.symbols()),
                "Completing row",
                "Registry and masking policy have diverged",
            )
        })?;

        Ok(Some((row, event)))
    }
}

impl<'r, E: EventSchema, O: ScoringOracle> Iterator for Generator<'r, E, O> {
    type Item = Result<EmittedRow<E>>;

    fn next(&mut self) -> Option<Self::Item> {
        if matches!(self.state, DecodeState::StreamTerminal(_)) {
            return None;
        }
        if self.rows.len() >= self.limit {
            self.terminate(FinishReason::MaxRows);
            return None;
        }

        let started = Instant::now();
        let result = self.decode_row();
        self.stats.elapsed += started.elapsed();

        match result {
            Ok(Some((row, event))) => {
                let time = self.clock.advance(&event);
                self.rows.push(row.clone());
                self.stats.rows_generated += 1;
                self.state = DecodeState::RowComplete;
                debug!(
                    "Committed row {} ({}) at time {}",
                    self.rows.len(),
                    event.kind.name(),
                    time
                );
                Some(Ok(EmittedRow { row, event, time }))
            }
            Ok(None) => {
                self.terminate(FinishReason::EndOfStream);
                None
            }
            Err(err) => {
                warn!("Generation aborted after {} rows: {}", self.stats.rows_generated, err);
                self.terminate(FinishReason::Error);
                Some(Err(err))
            }
        }
    }
}

fn normalize_prompt<E: EventSchema>(
    registry: &Registry<E>,
    prompt: Vec<Row>,
    max_prompt_rows: usize,
) -> Vec<Row> {
    let width = registry.row_width();
    let mut rows: Vec<Row> = prompt
        .into_iter()
        .take(max_prompt_rows)
        .map(|row| row.normalized(width))
        .collect();

    while rows.last().and_then(Row::head) == Some(EOS_ID) {
        rows.pop();
    }

    if rows.first().and_then(Row::head) != Some(BOS_ID) {
        rows.insert(0, Row::marker(BOS_ID, width));
    }

    rows
}
