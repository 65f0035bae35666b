use secdkit::builtins::Prelude;
use secdkit::vm::{MachineConfig, Outcome, ProgramShape, Value};
use std::fs;
use std::path::PathBuf;

/// E2E 통합 테스트: tests/programs/ 디렉터리의 모든 .lisp 파일을
/// 컴파일하고 실행하여 헤더에 적힌 기대값과 비교합니다.
///
/// Header lines (leading `;;` comments):
///   `;; expect: <value>`        the program halts with this value
///   `;; expect-error: <text>`   compilation fails with a message containing text
///   `;; expect-fault: <text>`   the machine faults with a message containing text
///   `;; args: <sexp>`           argument list (default NIL)
///   `;; flags: prelude applied` compile options

#[derive(Debug, Default)]
struct Header {
    expect: Option<String>,
    expect_error: Option<String>,
    expect_fault: Option<String>,
    args: Option<String>,
    prelude: bool,
    applied: bool,
}

fn parse_header(source: &str) -> Header {
    let mut header = Header::default();
    for line in source.lines() {
        let Some(rest) = line.trim().strip_prefix(";;") else {
            continue;
        };
        let Some((key, value)) = rest.split_once(':') else {
            continue;
        };
        let value = value.trim().to_string();
        match key.trim() {
            "expect" => header.expect = Some(value),
            "expect-error" => header.expect_error = Some(value),
            "expect-fault" => header.expect_fault = Some(value),
            "args" => header.args = Some(value),
            "flags" => {
                for flag in value.split_whitespace() {
                    match flag {
                        "prelude" => header.prelude = true,
                        "applied" => header.applied = true,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }
    header
}

fn get_test_programs() -> Vec<PathBuf> {
    let test_dir = PathBuf::from("tests/programs");
    if !test_dir.exists() {
        return vec![];
    }

    let mut programs = vec![];
    if let Ok(entries) = fs::read_dir(&test_dir) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|s| s.to_str()) == Some("lisp") {
                programs.push(path);
            }
        }
    }
    programs.sort();
    programs
}

fn run_test_program(path: &PathBuf) -> Result<(), String> {
    let source = fs::read_to_string(path).map_err(|e| e.to_string())?;
    let path_str = path.to_string_lossy().to_string();
    let header = parse_header(&source);

    let shape = if header.applied {
        ProgramShape::Applied
    } else {
        ProgramShape::Expression
    };
    let prelude = Prelude::standard();
    let compiled = secdkit::compile_source(&source, shape, header.prelude.then_some(&prelude));

    let module = match (compiled, &header.expect_error) {
        (Err(diagnostics), Some(expected)) => {
            return if diagnostics.iter().any(|d| d.message.contains(expected.as_str())) {
                Ok(())
            } else {
                Err(format!("{}: expected error '{}', got {:?}", path_str, expected, diagnostics))
            };
        }
        (Err(diagnostics), None) => {
            return Err(format!(
                "Compile error in {}: {}",
                path_str,
                diagnostics
                    .iter()
                    .map(|d| d.format(&path_str, &source, "Compile Error", 0))
                    .collect::<String>()
            ));
        }
        (Ok(_), Some(expected)) => {
            return Err(format!("{}: expected compile error '{}'", path_str, expected));
        }
        (Ok(module), None) => module,
    };

    let args = match &header.args {
        Some(text) => secdkit::read_value(text).map_err(|d| format!("bad args: {:?}", d))?,
        None => Value::Nil,
    };

    match secdkit::run_module(&module, args, MachineConfig::default()) {
        Outcome::Halted(v) => {
            if let Some(expected) = &header.expect_fault {
                return Err(format!("{}: expected fault '{}', halted with {}", path_str, expected, v));
            }
            let expected = header
                .expect
                .as_deref()
                .ok_or_else(|| format!("{}: missing ';; expect:' header", path_str))?;
            let expected = secdkit::read_value(expected).map_err(|d| format!("bad expect: {:?}", d))?;
            if v == expected {
                Ok(())
            } else {
                Err(format!("{}: expected {}, got {}", path_str, expected, v))
            }
        }
        Outcome::Faulted(err) => match &header.expect_fault {
            Some(expected) if err.message.contains(expected.as_str()) => Ok(()),
            _ => Err(format!("VM error in {}: {:?}", path_str, err)),
        },
    }
}

#[test]
fn test_e2e_all_programs() {
    let programs = get_test_programs();

    if programs.is_empty() {
        println!("Warning: No test programs found in tests/programs/");
        return;
    }

    let mut passed = 0;
    let mut failed = 0;

    for path in programs {
        let name = path.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        print!("Testing {}... ", name);

        match run_test_program(&path) {
            Ok(()) => {
                println!("✓ PASSED");
                passed += 1;
            }
            Err(err) => {
                println!("✗ ERROR: {}", err);
                failed += 1;
            }
        }
    }

    println!("\n========================================");
    println!("E2E Test Summary:");
    println!("  Passed: {}", passed);
    println!("  Failed: {}", failed);
    println!("  Total:  {}", passed + failed);
    println!("========================================");

    assert_eq!(failed, 0, "Some E2E tests failed");
}

macro_rules! test_program {
    ($test_name:ident, $filename:literal) => {
        #[test]
        fn $test_name() {
            let _ = include_str!(concat!("programs/", $filename));

            let path = PathBuf::from(concat!("tests/programs/", $filename));
            let result = run_test_program(&path);
            assert!(result.is_ok(), "{}: {:?}", $filename, result.err());
        }
    };
}

// Generate tests for each program
test_program!(test_arith, "arith.lisp");
test_program!(test_division, "division.lisp");
test_program!(test_select, "select.lisp");
test_program!(test_pairs, "pairs.lisp");
test_program!(test_equality, "equality.lisp");
test_program!(test_eq_closures, "eq_closures.lisp");
test_program!(test_let, "let.lisp");
test_program!(test_closures, "closures.lisp");
test_program!(test_sum, "sum.lisp");
test_program!(test_deep_sum, "deep_sum.lisp");
test_program!(test_mutual, "mutual.lisp");
test_program!(test_list_functions, "list_functions.lisp");
test_program!(test_applied, "applied.lisp");
test_program!(test_prelude, "prelude.lisp");
test_program!(test_undeclared, "undeclared.lisp");
test_program!(test_primitive_arity, "primitive_arity.lisp");
test_program!(test_car_of_int, "car_of_int.lisp");
test_program!(test_zero_division, "zero_division.lisp");
