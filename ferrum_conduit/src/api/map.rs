use crate::api::context::TaskContext;

/// A Mapper is the user code behind the `mapper` binding of a job.
///
/// `setup` runs once before the first record and `cleanup` once after the
/// last one; both default to doing nothing.
pub trait Mapper: Send {
    fn setup(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }

    fn map(&mut self, key: String, value: String, ctx: &mut TaskContext<'_>) -> anyhow::Result<()>;

    fn cleanup(&mut self, _ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Writes every record unchanged.
#[derive(Debug, Default)]
pub struct IdentityMapper;

impl Mapper for IdentityMapper {
    fn map(&mut self, key: String, value: String, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        ctx.write(key, value)?;
        Ok(())
    }
}
