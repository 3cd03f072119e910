use clap::{Parser, Subcommand};
use colored::Colorize;
use itertools::Itertools;
use miette::IntoDiagnostic;
use miette::miette;
use std::io::{self, BufWriter, IsTerminal, Read, Write};
use std::fs;
use std::path::{Path, PathBuf};
use xpr_lang::{Bindings, Expression, Options, Value};

#[derive(Parser, Debug, Default)]
#[command(name = "xpr")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(after_help = "# Examples:\n\n\
    ## To evaluate an expression:\n\
    xpr --var x=3 '2 * x + 1'\n\n\
    ## To read the expression from a file:\n\
    xpr -f formula.xpr --bindings input.json\n\n\
    ## To fold known values and print the result:\n\
    xpr --simplify --var y=4 'x * (y * atan(1))'\n\n\
    ## To check expression files for syntax errors:\n\
    xpr check formula.xpr")]
#[command(
    about = "xpr evaluates, simplifies and rewrites expressions written in a small expression language.",
    long_about = None
)]
pub struct Cli {
    #[clap(flatten)]
    input: InputArgs,

    #[clap(flatten)]
    output: OutputArgs,

    #[clap(subcommand)]
    commands: Option<Commands>,

    /// Expression to evaluate; read from stdin when omitted
    #[arg(value_name = "EXPRESSION OR FILE")]
    expression: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Json,
    Text,
    None,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct InputArgs {
    /// Load the expression from the file
    #[arg(short, long, default_value_t = false)]
    from_file: bool,

    /// Bind a variable; the value is parsed as JSON and taken as a string otherwise
    #[arg(long = "var", value_name = "NAME=JSON")]
    vars: Vec<String>,

    /// Load bindings from a JSON object file
    #[arg(short, long, value_name = "FILE")]
    bindings: Option<PathBuf>,

    /// Load parser options from a JSON file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Enable an operator category
    #[arg(long, value_name = "CATEGORY")]
    enable: Vec<String>,

    /// Disable an operator category
    #[arg(long, value_name = "CATEGORY")]
    disable: Vec<String>,

    /// Reject member access at evaluation
    #[arg(long, default_value_t = false)]
    no_member_access: bool,
}

#[derive(Clone, Debug, clap::Args, Default)]
struct OutputArgs {
    /// Set output format
    #[arg(short = 'F', long, value_enum, default_value_t)]
    output_format: OutputFormat,

    /// Pretty-print JSON output
    #[arg(long, default_value_t = false)]
    pretty: bool,

    /// Print the compiled instruction sequence
    #[arg(long, default_value_t = false)]
    ast: bool,

    /// Print the expression rendered back to source
    #[arg(long = "to-string", default_value_t = false)]
    to_source: bool,

    /// Print the expression rendered as JavaScript
    #[arg(long, default_value_t = false)]
    to_js: bool,

    /// Fold everything the bindings make known and print the result
    #[arg(long, default_value_t = false)]
    simplify: bool,

    /// Print the variables the expression reads
    #[arg(long, default_value_t = false)]
    variables: bool,

    /// Print every symbol the expression references, functions included
    #[arg(long, default_value_t = false)]
    symbols: bool,

    /// Report member paths such as `user.name` in --variables and --symbols
    #[arg(long, default_value_t = false)]
    with_members: bool,

    /// Output to the specified file
    #[clap(short = 'o', long = "output", value_name = "FILE")]
    output_file: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Check syntax errors in expression files
    Check {
        /// Path to the expression file to check
        files: Vec<PathBuf>,
    },
}

enum Output {
    Value(Value),
    Source(String),
    Names(Vec<String>),
}

impl Cli {
    pub fn run(&self) -> miette::Result<()> {
        match &self.commands {
            Some(Commands::Check { files }) => self.check(files),
            None => {
                let source = self.get_expression()?;
                let output = self.execute(&source)?;
                self.print(output)
            }
        }
    }

    fn check(&self, files: &[PathBuf]) -> miette::Result<()> {
        let parser = self.create_parser()?;
        let stdout = io::stdout();
        let mut handle = BufWriter::new(stdout.lock());
        let mut has_error = false;

        for file in files {
            if !file.exists() {
                return Err(miette!("File not found: {}", file.display()));
            }

            let content = fs::read_to_string(file).into_diagnostic()?;

            if let Err(err) = parser.parse(&content) {
                has_error = true;
                writeln!(handle, "{}", format!("Checking: {}", file.display()).bold()).into_diagnostic()?;
                writeln!(handle, "  {}: {}", "Error".red().bold(), err).into_diagnostic()?;
                writeln!(handle).into_diagnostic()?;
            }
        }

        handle.flush().into_diagnostic()?;

        if has_error { Err(miette!("")) } else { Ok(()) }
    }

    fn create_parser(&self) -> miette::Result<xpr_lang::Parser> {
        let mut options = match &self.input.config {
            Some(path) => serde_json::from_str::<Options>(&read_file(path)?).into_diagnostic()?,
            None => Options::default(),
        };

        for category in &self.input.enable {
            options = options.enable(category.as_str());
        }

        for category in &self.input.disable {
            options = options.disable(category.as_str());
        }

        if self.input.no_member_access {
            options = options.with_member_access(false);
        }

        tracing::debug!(?options, "parser options");
        Ok(xpr_lang::Parser::new(options))
    }

    fn create_bindings(&self) -> miette::Result<Bindings> {
        let bindings = match &self.input.bindings {
            Some(path) => match serde_json::from_str::<serde_json::Value>(&read_file(path)?).into_diagnostic()? {
                serde_json::Value::Object(map) => Bindings::from(map),
                _ => return Err(miette!("Bindings must be a JSON object: {}", path.display())),
            },
            None => Bindings::new(),
        };

        for var in &self.input.vars {
            let (name, raw) = var
                .split_once('=')
                .ok_or_else(|| miette!("Invalid variable \"{}\", expected NAME=JSON", var))?;
            let value = serde_json::from_str::<serde_json::Value>(raw)
                .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));

            bindings.set(name.trim(), Value::from(value));
        }

        Ok(bindings)
    }

    fn get_expression(&self) -> miette::Result<String> {
        match self.expression.as_ref() {
            Some(path) if self.input.from_file => read_file(Path::new(path)),
            Some(expression) => Ok(expression.clone()),
            None if !io::stdin().is_terminal() => {
                let mut input = String::new();
                io::stdin().read_to_string(&mut input).into_diagnostic()?;
                Ok(input)
            }
            None => Err(miette!("Expression is required")),
        }
    }

    fn execute(&self, source: &str) -> miette::Result<Output> {
        let parser = self.create_parser()?;
        let expression = parser.parse(source)?;
        let output = &self.output;

        if output.ast {
            return Ok(Output::Source(xpr_lang::dump(expression.program())));
        }

        if output.to_source {
            return Ok(Output::Source(expression.to_string()));
        }

        if output.to_js {
            return Ok(Output::Source(expression.to_js_string()));
        }

        if output.variables {
            return Ok(names(expression.variables(output.with_members)));
        }

        if output.symbols {
            return Ok(names(expression.symbols(output.with_members)));
        }

        let bindings = self.create_bindings()?;

        if output.simplify {
            let simplified = expression.simplify(&bindings).map_err(|e| report(source, e))?;
            return Ok(Output::Source(simplified.to_string()));
        }

        evaluate(&expression, &bindings).map(Output::Value).map_err(|e| report(source, e))
    }

    fn print(&self, output: Output) -> miette::Result<()> {
        if self.output.output_format == OutputFormat::None {
            return Ok(());
        }

        let stdout = io::stdout();
        let mut handle: Box<dyn Write> = if let Some(output_file) = &self.output.output_file {
            let file = fs::File::create(output_file).into_diagnostic()?;
            Box::new(BufWriter::new(file))
        } else {
            Box::new(BufWriter::new(stdout.lock()))
        };

        let text = match (output, &self.output.output_format) {
            (Output::Source(source), _) => source,
            (Output::Value(value), OutputFormat::Text) => value.to_string(),
            (Output::Names(names), OutputFormat::Text) => names.iter().join("\n"),
            (Output::Value(value), _) => self.json(&value.to_json())?,
            (Output::Names(names), _) => self.json(&serde_json::Value::from(names))?,
        };

        writeln!(handle, "{}", text).into_diagnostic()?;
        handle.flush().into_diagnostic()
    }

    fn json(&self, value: &serde_json::Value) -> miette::Result<String> {
        if self.output.pretty {
            serde_json::to_string_pretty(value).into_diagnostic()
        } else {
            serde_json::to_string(value).into_diagnostic()
        }
    }
}

fn evaluate(expression: &Expression, bindings: &Bindings) -> Result<Value, xpr_lang::EvalError> {
    futures::executor::block_on(expression.evaluate_async(bindings))
}

fn names(names: Vec<impl ToString>) -> Output {
    Output::Names(names.iter().map(ToString::to_string).collect())
}

fn report(source: &str, err: xpr_lang::EvalError) -> miette::Report {
    miette::Report::new(xpr_lang::Error::from_error(source, err.into()))
}

fn read_file(path: &Path) -> miette::Result<String> {
    if !path.exists() {
        return Err(miette!("File not found: {}", path.display()));
    }

    fs::read_to_string(path).into_diagnostic()
}
