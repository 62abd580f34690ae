use std::sync::Arc;

use ygg_types::{Context, KeyValue, Mutation, MutationResult, Range, WriteData, YggError};

use crate::engine::Engine;

/// Key-value operations addressed by a [`Context`]: region, partition and
/// timeout. Writes go through the engine's replicated path.
pub struct Storage<E> {
    engine: Arc<E>,
}

impl<E: Engine> Storage<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Storage { engine }
    }

    pub fn engine(&self) -> &Arc<E> {
        &self.engine
    }

    async fn write_one(
        &self,
        ctx: &Context,
        mutation: Mutation,
    ) -> Result<MutationResult, YggError> {
        let mut resp = self.engine.write(ctx, WriteData::new().add(mutation)).await?;
        resp.results
            .pop()
            .ok_or_else(|| YggError::Internal("write applied without a result".into()))
    }

    /// Values of the existing keys, in request order.
    pub fn kv_get(&self, ctx: &Context, keys: &[Vec<u8>]) -> Result<Vec<KeyValue>, YggError> {
        if keys.iter().any(|k| k.is_empty()) {
            return Err(YggError::KeyEmpty);
        }
        let reader = self.engine.new_reader(ctx.cf_name())?;
        let mut kvs = Vec::with_capacity(keys.len());
        for key in keys {
            if let Some(value) = reader.get(key)? {
                kvs.push(KeyValue::new(key.clone(), value));
            }
        }
        Ok(kvs)
    }

    pub fn kv_scan(&self, ctx: &Context, range: &Range) -> Result<Vec<KeyValue>, YggError> {
        self.engine.new_reader(ctx.cf_name())?.scan(&range.start_key, &range.end_key)
    }

    pub async fn kv_put(&self, ctx: &Context, kvs: Vec<KeyValue>) -> Result<(), YggError> {
        let cf = ctx.cf_name().to_string();
        self.write_one(ctx, Mutation::Put { cf, kvs }).await.map(|_| ())
    }

    /// Returns the keys that were written.
    pub async fn kv_put_if_absent(
        &self,
        ctx: &Context,
        kvs: Vec<KeyValue>,
        atomic: bool,
    ) -> Result<Vec<Vec<u8>>, YggError> {
        let cf = ctx.cf_name().to_string();
        match self.write_one(ctx, Mutation::PutIfAbsent { cf, kvs, atomic }).await? {
            MutationResult::PutIfAbsent { put_keys } => Ok(put_keys),
            other => Err(YggError::Internal(format!("unexpected result {other:?}"))),
        }
    }

    pub async fn kv_delete(&self, ctx: &Context, keys: Vec<Vec<u8>>) -> Result<(), YggError> {
        let cf = ctx.cf_name().to_string();
        self.write_one(ctx, Mutation::Delete { cf, keys }).await.map(|_| ())
    }

    pub async fn kv_delete_range(&self, ctx: &Context, range: Range) -> Result<(), YggError> {
        let cf = ctx.cf_name().to_string();
        self.write_one(ctx, Mutation::DeleteRange { cf, range }).await.map(|_| ())
    }

    /// Sets `kv` when the current value equals `expected`; an empty
    /// `expected` means the key must be absent. Returns whether it matched.
    pub async fn kv_compare_and_set(
        &self,
        ctx: &Context,
        kv: KeyValue,
        expected: Vec<u8>,
    ) -> Result<bool, YggError> {
        let cf = ctx.cf_name().to_string();
        match self.write_one(ctx, Mutation::CompareAndSet { cf, kv, expected }).await? {
            MutationResult::CompareAndSet { success } => Ok(success),
            other => Err(YggError::Internal(format!("unexpected result {other:?}"))),
        }
    }
}
