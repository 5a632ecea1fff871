use crate::api::context::TaskContext;

/// The values grouped under one key. They are produced lazily from the
/// merge-sorted input, so they can only be walked once.
pub struct Values<'a> {
    inner: Box<dyn Iterator<Item = String> + 'a>,
}

impl<'a> Values<'a> {
    pub fn new(inner: impl Iterator<Item = String> + 'a) -> Self {
        Values {
            inner: Box::new(inner),
        }
    }
}

impl Iterator for Values<'_> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        self.inner.next()
    }
}

/// Reducers and combiners share this trait, a combiner is simply a reducer
/// bound under the `combiner` kind.
pub trait Reducer: Send {
    fn setup(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn reduce(&mut self, key: String, values: Values<'_>, ctx: &mut TaskContext<'_>) -> anyhow::Result<()>;

    fn cleanup(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes every value back under its key.
#[derive(Debug, Default)]
pub struct IdentityReducer;

impl Reducer for IdentityReducer {
    fn reduce(&mut self, key: String, values: Values<'_>, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        for value in values {
            ctx.write(&key, value)?;
        }
        Ok(())
    }
}

/// Emits the number of values seen for each key.
#[derive(Debug, Default)]
pub struct CountReducer;

impl Reducer for CountReducer {
    fn reduce(&mut self, key: String, values: Values<'_>, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let count = values.count();
        ctx.write(key, count.to_string())?;
        Ok(())
    }
}

/// Sums integer values per key, usable as both combiner and reducer.
#[derive(Debug, Default)]
pub struct LongSumReducer;

impl Reducer for LongSumReducer {
    fn reduce(&mut self, key: String, values: Values<'_>, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        let mut sum: i64 = 0;
        for value in values {
            let value = value.trim().parse::<i64>()?;
            sum = match sum.checked_add(value) {
                Some(sum) => sum,
                None => anyhow::bail!("sum for key {} overflows", key),
            };
        }
        ctx.write(key, sum.to_string())?;
        Ok(())
    }
}
