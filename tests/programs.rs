//! End-to-end programs: source text in, serialized values and printed output out.
#![expect(clippy::unwrap_used)] // test code OK

use dxuq::environment::CapturedOutput;
use dxuq::evaluator::{EvalConfig, run_with_config};
use dxuq::{Environment, Error, interpret, run, run_program};

/// Expected outcome of one program step
#[derive(Debug)]
enum TestResult {
    Evaluates(&'static str),
    Fails(Error),
    /// Fails with an error whose message contains this text
    SpecificError(&'static str),
}
use TestResult::*;

/// Steps that run in order against one shared root environment
struct TestEnvironment(Vec<(&'static str, TestResult)>);

fn execute_test_case(input: &str, expected: &TestResult, env: &Environment, test_id: &str) {
    match (run(input, env), expected) {
        (Ok(actual), Evaluates(expected)) => assert_eq!(actual, *expected, "{test_id}: '{input}'"),
        (Err(actual), Fails(expected)) => assert_eq!(actual, *expected, "{test_id}: '{input}'"),
        (Err(actual), SpecificError(text)) => {
            let message = actual.to_string();
            assert!(
                message.contains(text),
                "{test_id}: '{input}' error should contain '{text}', got: {message}"
            );
        }
        (Ok(actual), expected) => panic!("{test_id}: '{input}' expected {expected:?}, got {actual}"),
        (Err(actual), Evaluates(expected)) => {
            panic!("{test_id}: '{input}' expected {expected}, got error {actual:?}")
        }
    }
}

fn run_tests_in_environment(test_environments: Vec<TestEnvironment>) {
    for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
        let env = Environment::root();
        for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
            let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
            execute_test_case(input, expected, &env, &test_id);
        }
    }
}

const FACT: &str = "{let {fact = \"bogus\"}
 in
 {begin
   {fact := {fn {n} {if {<= n 0} 1 {* n {fact {- n 1}}}}}}
   {fact 12}}}";

#[test]
fn test_reference_programs() {
    run_tests_in_environment(vec![
        TestEnvironment(vec![
            ("{+ 10 5}", Evaluates("15")),
            ("{/ 10 0}", Fails(Error::DivideByZero)),
            (FACT, Evaluates("479001600")),
            ("{let {x = 1} in {begin {x := {+ x x}} x}}", Evaluates("2")),
            ("{let {a = {array 1 2 3}} in {equal? a a}}", Evaluates("true")),
            ("{equal? {new-array 5 0} {new-array 5 0}}", Evaluates("false")),
            (
                "{let {f = {fn {x y} {+ {g x} y}}} {g = {fn {n} {+ n 1}}} in {f 1 {g 2}}}",
                Fails(Error::UndefinedSymbol("g".into())),
            ),
        ]),
        // Syntax and lexing failures surface through run
        TestEnvironment(vec![
            ("{+ 1 2", SpecificError("Unmatched parentheses")),
            ("(+ 1 2]", SpecificError("'(' closed by ']'")),
            ("{+ 1 #}", Fails(Error::UnknownText("#".into()))),
            ("\"\\q\"", Fails(Error::InvalidEscape("\\q".into()))),
            ("{fn {x x} x}", Fails(Error::DuplicateParameter("x x".into()))),
            ("{let {in = 1} in in}", SpecificError("Symbol in is protected")),
            ("{}", Fails(Error::UnknownToken("{}".into()))),
        ]),
        // Literal forms
        TestEnvironment(vec![
            ("0x1F", Evaluates("31")),
            ("0b1010", Evaluates("10")),
            ("0o17", Evaluates("15")),
            ("1_000", Evaluates("1000")),
            ("0x1.8p1", Evaluates("3")),
            ("1e3", Evaluates("1000")),
            ("\"tab\\there\"", Evaluates("\"tab\\there\"")),
            ("[+ (* 2 3) {- 1 1}]", Evaluates("6")),
        ]),
    ]);
}

#[test]
fn test_array_programs() {
    run_tests_in_environment(vec![TestEnvironment(vec![
        (
            "{let {a = {new-array 4 0}}
              in {begin {aset! a 0 10} {aset! a 3 {+ {aref a 0} 1}} {aref a 3}}}",
            Evaluates("11"),
        ),
        (
            "{let {a = {array 1 2}} {b = a} in {begin {aset! b 0 \"x\"} {aref a 0}}}",
            Evaluates("\"x\""),
        ),
        (
            "{let {a = {new-array 3 0}} {fill = void}
              in {begin
                   {fill := {fn {n} {if {< n 0} a {begin {aset! a n {* n n}} {fill {- n 1}}}}}}
                   {fill 2}
                   {+ {aref a 1} {aref a 2}}}}",
            Evaluates("5"),
        ),
        (
            "{let {a = {array 1 2 3}} in {aset! a 3 0}}",
            Fails(Error::Range("Index 3 out of range for array of length 3".into())),
        ),
        (
            "{let {a = {array 1 2 3}} in {aref a 1.5}}",
            Fails(Error::NotAnInteger("Value isn't an integer: 1.5".into())),
        ),
        ("{new-array 0 1}", SpecificError("positive element count")),
        ("{array}", SpecificError("at least one element")),
        ("{aref 1 0}", Fails(Error::NotAnArray("Expected an Array, got a Int.".into()))),
        ("{substring \"hi mom\" 3 6}", Evaluates("\"mom\"")),
        ("{substring \"abcd\" 0 0.23}", SpecificError("Value isn't an integer")),
    ])]);
}

#[test]
fn test_expression_chaining() {
    let root = Environment::root();
    assert_eq!(
        run_program("{x := 10} {begin {x := {+ x 5}} x} {+ x 5}", &root).unwrap(),
        vec!["void", "15", "20"]
    );

    let results = run_program(
        "{counter := 0}
         {bump := {fn {} {counter := {+ counter 1}}}}
         {bump} {bump} {bump}
         counter",
        &root,
    )
    .unwrap();
    assert_eq!(results.last().map(String::as_str), Some("3"));

    assert_eq!(
        run_program("{y := 1} {+ y z}", &root),
        Err(Error::UndefinedSymbol("z".into()))
    );
}

#[test]
fn test_short_circuit_never_runs_second_operand() {
    let captured = CapturedOutput::new();
    let env = Environment::root_with_output(captured.clone());

    let test_cases = vec![
        ("{and false {begin {print \"and\"} true}}", "false", ""),
        ("{or true {begin {print \"or\"} false}}", "true", ""),
        ("{and true {begin {print \"and\"} true}}", "true", "and"),
        ("{or false {begin {print \"or\"} false}}", "false", "or"),
        ("{if false {print \"then\"} {print \"else\"}}", "void", "else"),
        ("{xor false {begin {print \"xor\"} true}}", "true", "xor"),
    ];
    let mut printed = String::new();
    for (i, (input, value, output)) in test_cases.into_iter().enumerate() {
        assert_eq!(run(input, &env).unwrap(), value, "Short-circuit test #{}", i + 1);
        printed.push_str(output);
        assert_eq!(captured.contents(), printed, "Short-circuit output #{}", i + 1);
    }
}

#[test]
fn test_print_output() {
    let captured = CapturedOutput::new();
    let env = Environment::root_with_output(captured.clone());

    let results = run_program(
        "{print \"n = \" 42 \"\\n\"}
         {print {array 1 \"a\" {array true}} {fn {x} {+ x 1}} +}
         {print 2.5 void null}",
        &env,
    )
    .unwrap();
    assert_eq!(results, vec!["void", "void", "void"]);
    assert_eq!(
        captured.contents(),
        "n = 42\n{array 1 a {array true}}{fn {x} {+ x 1}}{+ ...}2.5voidnull"
    );
}

#[test]
fn test_independent_roots() {
    let first = Environment::root();
    let second = Environment::root();
    assert!(!first.storage().ptr_eq(second.storage()));

    run_program("{pi := 3}", &first).unwrap();
    assert_eq!(run("pi", &first), Ok("3".into()));
    assert_eq!(run("pi", &second), Ok("3.141592653589793".into()));

    assert_eq!(interpret("{leaked := 1}"), Ok("void".into()));
    assert_eq!(interpret("leaked"), Err(Error::UndefinedSymbol("leaked".into())));
}

#[test]
fn test_default_depth_limit() {
    // The default limit is reached long before a roomy stack is exhausted
    let handle = std::thread::Builder::new()
        .stack_size(64 * 1024 * 1024)
        .spawn(|| {
            let env = Environment::root();
            let forever = "{let {f = 0} in {begin {f := {fn {} {f}}} {f}}}";
            let sum = |n: u32| {
                format!(
                    "{{let {{sum = 0}} in {{begin \
                     {{sum := {{fn {{n}} {{if {{<= n 0}} 0 {{+ n {{sum {{- n 1}}}}}}}}}}}} \
                     {{sum {n}}}}}}}"
                )
            };
            (
                run(forever, &env),
                run_with_config(forever, &env, &EvalConfig { max_depth: 32 }),
                run(&sum(100), &env),
                run(&sum(300), &env),
            )
        })
        .unwrap();
    let (default, custom, sum_100, sum_300) = handle.join().unwrap();
    assert_eq!(default, Err(Error::EvalDepthExceeded(dxuq::MAX_EVAL_DEPTH)));
    assert_eq!(custom, Err(Error::EvalDepthExceeded(32)));
    // Ordinary recursion a few hundred calls deep fits the default limit
    assert_eq!(sum_100, Ok("5050".into()));
    assert_eq!(sum_300, Ok("45150".into()));
}
