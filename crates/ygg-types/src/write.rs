use crate::{KeyValue, Range, YggError, DATA_CF};

/// One typed mutation inside a write command.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Mutation {
    Put {
        cf: String,
        kvs: Vec<KeyValue>,
    },
    /// With `atomic` set, nothing is written if any key already exists.
    /// Otherwise only the absent keys are written.
    PutIfAbsent {
        cf: String,
        kvs: Vec<KeyValue>,
        atomic: bool,
    },
    Delete {
        cf: String,
        keys: Vec<Vec<u8>>,
    },
    DeleteRange {
        cf: String,
        range: Range,
    },
    CompareAndSet {
        cf: String,
        kv: KeyValue,
        /// Empty means "key must be absent".
        expected: Vec<u8>,
    },
}

impl Mutation {
    pub fn cf(&self) -> &str {
        match self {
            Mutation::Put { cf, .. }
            | Mutation::PutIfAbsent { cf, .. }
            | Mutation::Delete { cf, .. }
            | Mutation::DeleteRange { cf, .. }
            | Mutation::CompareAndSet { cf, .. } => cf,
        }
    }

    /// Rejects empty key lists and empty keys.
    pub fn validate(&self) -> Result<(), YggError> {
        match self {
            Mutation::Put { kvs, .. } | Mutation::PutIfAbsent { kvs, .. } => {
                if kvs.is_empty() || kvs.iter().any(|kv| kv.key.is_empty()) {
                    return Err(YggError::KeyEmpty);
                }
            }
            Mutation::Delete { keys, .. } => {
                if keys.is_empty() || keys.iter().any(|k| k.is_empty()) {
                    return Err(YggError::KeyEmpty);
                }
            }
            // An empty end reaches the end of the key space.
            Mutation::DeleteRange { range, .. } => {
                if range.start_key.is_empty() {
                    return Err(YggError::KeyEmpty);
                }
                if !range.end_key.is_empty() && range.start_key >= range.end_key {
                    return Err(YggError::InvalidArgument(
                        "range start must be below range end".into(),
                    ));
                }
            }
            Mutation::CompareAndSet { kv, .. } => {
                if kv.key.is_empty() {
                    return Err(YggError::KeyEmpty);
                }
            }
        }
        Ok(())
    }

    /// True when every key this mutation touches lies in `range`.
    pub fn within(&self, range: &Range) -> bool {
        match self {
            Mutation::Put { kvs, .. } | Mutation::PutIfAbsent { kvs, .. } => {
                kvs.iter().all(|kv| range.contains(&kv.key))
            }
            Mutation::Delete { keys, .. } => keys.iter().all(|k| range.contains(k)),
            Mutation::DeleteRange { range: r, .. } => range.covers(&r.start_key, &r.end_key),
            Mutation::CompareAndSet { kv, .. } => range.contains(&kv.key),
        }
    }
}

/// Mutations a caller wants applied as one atomic log entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteData {
    mutations: Vec<Mutation>,
}

impl WriteData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(mut self, mutation: Mutation) -> Self {
        self.mutations.push(mutation);
        self
    }

    pub fn put(cf: impl Into<String>, kvs: Vec<KeyValue>) -> Self {
        WriteData::new().add(Mutation::Put { cf: cf.into(), kvs })
    }

    /// Single put into the default data partition.
    pub fn put_one(key: impl Into<Vec<u8>>, value: impl Into<Vec<u8>>) -> Self {
        WriteData::put(DATA_CF, vec![KeyValue::new(key, value)])
    }

    pub fn mutations(&self) -> &[Mutation] {
        &self.mutations
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn into_mutations(self) -> Vec<Mutation> {
        self.mutations
    }

    pub fn validate(&self) -> Result<(), YggError> {
        if self.mutations.is_empty() {
            return Err(YggError::InvalidArgument("write carries no mutations".into()));
        }
        self.mutations.iter().try_for_each(Mutation::validate)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MutationResult {
    Put,
    PutIfAbsent { put_keys: Vec<Vec<u8>> },
    Delete,
    DeleteRange,
    CompareAndSet { success: bool },
}

/// Outcome of one committed and applied write command.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct WriteResponse {
    pub results: Vec<MutationResult>,
}
