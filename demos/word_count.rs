use ferrum_conduit::api::context::TaskContext;
use ferrum_conduit::api::map::Mapper;
use ferrum_conduit::core::job::Format;
use ferrum_conduit::core::registry::Registry;
use ferrum_conduit::framework::cli::{self, SetupFn};
use ferrum_conduit::framework::dsl::{ConfigurationDefinition, InputOptions, OutputOptions};
use ferrum_conduit::framework::errors::FerrumConduitError;
use std::process::ExitCode;

/// Emits `(word, 1)` for every word of a line.
struct WordCounter;

impl Mapper for WordCounter {
    fn map(&mut self, _key: String, value: String, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        for word in value.split_whitespace() {
            ctx.write(word.to_lowercase(), "1")?;
        }
        Ok(())
    }
}

/// Swaps `(word, count)` into `(count, word)` so a second job can sort by
/// frequency.
struct Invert;

impl Mapper for Invert {
    fn map(&mut self, _key: String, value: String, ctx: &mut TaskContext<'_>) -> anyhow::Result<()> {
        if let Some((word, count)) = value.split_once('\t') {
            ctx.write(format!("{:>12}", count.trim()), word)?;
        }
        Ok(())
    }
}

/// word_count run <input> <output>
fn main() -> ExitCode {
    let mut registry = Registry::with_builtins();
    registry
        .register_mapper("word_count::words", || WordCounter)
        .register_mapper("word_count::invert", || Invert);

    let setup: SetupFn = Box::new(|conf: &mut ConfigurationDefinition| {
        let (input, output) = match conf.arguments() {
            [input, output, ..] => (input.clone(), output.clone()),
            _ => {
                return Err(FerrumConduitError::ArgumentError(
                    "usage: word_count run <input> <output>".to_string(),
                ))
            }
        };

        let mut counts = String::new();
        conf.job("word_count", |job| {
            job.input(input.as_str(), InputOptions::default())?;
            counts = job.output(
                Some("word_count"),
                OutputOptions {
                    intermediate: true,
                    ..OutputOptions::default()
                },
            )?;
            job.set_mapper("word_count::words")
                .set_combiner("conduit::long_sum_reducer")
                .set_reducer("conduit::long_sum_reducer");
            Ok(())
        })?;

        conf.job("by_frequency", |job| {
            job.input(counts.as_str(), InputOptions::default())?;
            job.output(
                Some(output.as_str()),
                OutputOptions {
                    format: Format::shorthand("text"),
                    lazy: true,
                    ..OutputOptions::default()
                },
            )?;
            job.set_mapper("word_count::invert")
                .set_reducer("conduit::identity_reducer")
                .set("mapreduce.job.reduces", 1);
            Ok(())
        })
    });

    cli::main_with(registry, Some(("word_count", setup)))
}
