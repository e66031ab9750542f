use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use coolfront::Compiler;
use coolfront::error::CoolError;
use coolfront::parser;
use coolfront::semantic::SemanticAnalyzer;
use tracing_subscriber::EnvFilter;

/// COOL 前端：分析源文件并输出诊断
#[derive(Parser, Debug)]
#[command(name = "cool-check", version, about = "Parse and type-check a COOL source file")]
struct Cli {
    /// 源文件
    file: PathBuf,

    /// 输出记号流
    #[arg(long)]
    tokens: bool,

    /// 输出归约序列
    #[arg(long)]
    derivation: bool,

    /// 输出 AST
    #[arg(long)]
    ast: bool,

    /// 输出类型表
    #[arg(long)]
    context: bool,

    /// 输出作用域树
    #[arg(long)]
    scopes: bool,

    /// 输出全部内容
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    // 只有设置了 COOL_LOG 才输出日志
    if let Ok(filter) = EnvFilter::try_from_env("COOL_LOG") {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }

    let cli = Cli::parse();
    match run(&cli) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

/// 返回是否没有任何诊断
fn run(cli: &Cli) -> anyhow::Result<bool> {
    let source = fs::read_to_string(&cli.file)
        .with_context(|| format!("failed to read {}", cli.file.display()))?;
    let compiler = Compiler::new();
    let lexed = compiler.tokenize(&source);

    if cli.tokens || cli.verbose {
        println!("== tokens ==");
        for token in &lexed.tokens {
            println!("{:>8}  {:<8} {}", token.loc.to_string(), token.token.terminal(), token.lexeme);
        }
    }
    if !lexed.is_clean() {
        return Err(CoolError::Lexical(lexed.errors)).context("lexical analysis failed");
    }

    let parsed = parser::parse(&lexed).context("syntax analysis failed")?;
    if cli.derivation || cli.verbose {
        let grammar = parser::cool_parser()?.grammar();
        println!("== derivation ==");
        for id in parsed.derivation.rightmost() {
            println!("{}", grammar.display_production(id));
        }
    }

    let analysis = SemanticAnalyzer::new().analyze(parsed.program);
    if cli.ast || cli.verbose {
        println!("== ast ==");
        println!("{:#?}", analysis.program);
    }
    if cli.context || cli.verbose {
        println!("== types ==");
        print!("{}", analysis.context);
    }
    if cli.scopes || cli.verbose {
        println!("== scopes ==");
        print!("{}", analysis.scopes.render(&analysis.context));
    }

    for diagnostic in &analysis.diagnostics {
        println!("{}", diagnostic);
    }
    println!(
        "{}: {} diagnostic(s)",
        cli.file.display(),
        analysis.diagnostics.len()
    );
    Ok(analysis.is_clean())
}
