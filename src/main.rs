use minic::diagnostics::{
    emit_lex_errors, emit_syntax_errors, report_io_error, report_semantic_errors,
};
use minic::language::{gen, lexer, parser, printer, sem};
use std::env;
use std::fs;
use std::path::Path;
use std::process::exit;

const USAGE: &str = "Usage: minic [lexer|parser|ast|sem|gen] <file.c> [output.asm]";

fn main() {
    let args: Vec<String> = env::args().collect();

    if args.len() < 3 {
        eprintln!("{}", USAGE);
        exit(1);
    }

    let mode = &args[1];
    let filename = &args[2];

    if !filename.ends_with(".c") {
        eprintln!("Invalid file extension. Only .c files are allowed.");
        exit(1);
    }

    let source = match fs::read_to_string(filename) {
        Ok(source) => source,
        Err(err) => {
            report_io_error(Path::new(filename), &err);
            exit(1);
        }
    };

    match mode.as_str() {
        "lexer" => match lexer::lex(&source) {
            Ok(tokens) => {
                for token in tokens {
                    println!("{}", token.kind);
                }
            }
            Err(errors) => {
                emit_lex_errors(filename, &source, errors);
                exit(1);
            }
        },
        "parser" => match parser::parse(&source) {
            Ok(_) => println!("Parsing successful"),
            Err(errors) => {
                emit_syntax_errors(filename, &source, &errors);
                exit(1);
            }
        },
        "ast" => match parser::parse(&source) {
            Ok(program) => println!("{}", printer::print_program(&program)),
            Err(errors) => {
                emit_syntax_errors(filename, &source, &errors);
                exit(1);
            }
        },
        "sem" => {
            let program = parse_or_exit(filename, &source);
            let errors = sem::analyse(&program);
            if !errors.is_empty() {
                report_semantic_errors(&source, &errors);
                exit(1);
            }
            println!("Semantic analysis successful");
        }
        "gen" => {
            let program = parse_or_exit(filename, &source);
            let errors = sem::analyse(&program);
            if !errors.is_empty() {
                report_semantic_errors(&source, &errors);
                exit(1);
            }
            let assembly = match gen::emit_program(&program) {
                Ok(assembly) => assembly,
                Err(err) => {
                    eprintln!("codegen error: {}", err);
                    exit(1);
                }
            };
            let output = args.get(3).map(String::as_str).unwrap_or("out.asm");
            if let Err(err) = fs::write(output, assembly) {
                report_io_error(Path::new(output), &err);
                exit(1);
            }
        }
        _ => {
            eprintln!("Invalid mode. {}", USAGE);
            exit(1);
        }
    }
}

fn parse_or_exit(filename: &str, source: &str) -> minic::language::ast::Program {
    match parser::parse(source) {
        Ok(program) => program,
        Err(errors) => {
            emit_syntax_errors(filename, source, &errors);
            exit(1);
        }
    }
}
