//! Evaluation engine.
//!
//! [`Evaluator`] walks expanded [`Expr`] trees against a chain of [`Scope`]s.
//! Ordinary calls recurse on the host stack, one level per non-tail call.
//! Calls in tail position do not: the running frame on the explicit
//! call stack is rewritten with the callee and its arguments, and the loop that
//! runs that frame's body starts over. Self and mutual tail recursion therefore
//! run in constant host stack.
//!
//! ```
//! use tramlisp::{Evaluator, Value};
//!
//! let mut evaluator = Evaluator::new();
//! let value = evaluator.eval_source(
//!     "(define count (lambda (n acc) (cond ((= n 0) acc) (else (count (- n 1) (+ acc 1))))))
//!      (count 100000 0)",
//! )?;
//! assert_eq!(value, Value::Int(100000));
//! # Ok::<(), tramlisp::Error>(())
//! ```

mod callstack;
mod environment;

pub use environment::{Env, Scope};

use self::callstack::CallStack;
use crate::ast::{Branch, Expr, Guard};
use crate::intern::{Symbol, intern};
use crate::scheme::{ParseConfig, Reader};
use crate::syntax::expand;
use crate::value::{Procedure, Value};
use crate::{Error, MAX_CALL_DEPTH};
use std::rc::Rc;
use tracing::{debug, trace};

/// Evaluator settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvalConfig {
    /// Rewrite the running frame for calls in tail position
    pub tail_calls: bool,
    /// Maximum number of live procedure frames
    pub max_call_depth: usize,
}

impl Default for EvalConfig {
    fn default() -> Self {
        EvalConfig {
            tail_calls: true,
            max_call_depth: MAX_CALL_DEPTH,
        }
    }
}

/// Interpreter state: the root scope plus the explicit call stack
pub struct Evaluator {
    root: Env,
    stack: CallStack,
    config: EvalConfig,
    /// Set while the expression being evaluated is the final one of its body
    last: bool,
}

impl Default for Evaluator {
    fn default() -> Self {
        Evaluator::new()
    }
}

impl Evaluator {
    pub fn new() -> Self {
        Evaluator::with_config(EvalConfig::default())
    }

    /// Create an evaluator whose root scope holds every builtin
    pub fn with_config(config: EvalConfig) -> Self {
        Evaluator {
            root: Scope::root(),
            stack: CallStack::new(),
            config,
            last: false,
        }
    }

    pub fn config(&self) -> EvalConfig {
        self.config
    }

    /// The root scope that top-level `define`s write to
    pub fn root(&self) -> &Env {
        &self.root
    }

    /// Number of live procedure frames; zero between top-level evaluations
    pub fn call_depth(&self) -> usize {
        self.stack.depth()
    }

    /// Evaluate one expanded expression in the root scope.
    ///
    /// On error the call stack is cleared, so the next top-level expression
    /// starts from a clean state. Bindings made before the error are kept.
    pub fn eval(&mut self, expr: &Expr) -> Result<Value, Error> {
        let root = Rc::clone(&self.root);
        self.last = false;
        let result = self.eval_expr(expr, &root);
        if let Err(err) = &result {
            debug!(error = %err, depth = self.stack.depth(), "evaluation failed, resetting call stack");
            self.stack.clear();
            self.last = false;
        }
        result
    }

    /// Read, expand and evaluate every expression in `source`, returning the
    /// value of the last one (Nil for empty input). Stops at the first error.
    pub fn eval_source(&mut self, source: &str) -> Result<Value, Error> {
        self.eval_source_with(source, ParseConfig::default())
    }

    pub fn eval_source_with(&mut self, source: &str, config: ParseConfig) -> Result<Value, Error> {
        let mut result = Value::Nil;
        for raw in Reader::new(source, config) {
            let expr = expand(&raw?)?;
            result = self.eval(&expr)?;
        }
        Ok(result)
    }

    fn eval_expr(&mut self, expr: &Expr, env: &Env) -> Result<Value, Error> {
        match expr {
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Ident(name) => env.lookup(*name).ok_or_else(|| Error::Unbound(name.name())),
            Expr::Quote(datum) => quote(datum),
            Expr::List(items) => self.eval_application(items, env),
            Expr::Define { ident, value } => self.eval_define(*ident, value, env),
            Expr::Set { ident, value } => self.eval_set(*ident, value, env),
            Expr::Lambda(lambda) => Ok(Value::Proc(Rc::new(Procedure::new(
                Rc::clone(lambda),
                Rc::clone(env),
            )))),
            Expr::Cond(branches) => self.eval_cond(branches, env),
        }
    }

    /// Decide whether the expression about to run is a tail call.
    /// Consumes the last-expression flag: sub-expressions are never in tail position.
    fn take_tail_position(&mut self) -> bool {
        let tail = self.config.tail_calls && self.stack.is_last() && self.last;
        self.last = false;
        tail
    }

    fn eval_application(&mut self, items: &[Expr], env: &Env) -> Result<Value, Error> {
        let tail = self.take_tail_position();
        let (head, operands) = items.split_first().ok_or(Error::MissingProcedure)?;

        let operator = self.eval_expr(head, env)?;
        let args = operands
            .iter()
            .map(|operand| self.eval_expr(operand, env))
            .collect::<Result<Vec<_>, _>>()?;

        match operator {
            Value::Builtin(op) => op.call(&args),
            Value::Proc(proc) if tail => {
                debug!(
                    procedure = %procedure_name(&proc),
                    depth = self.stack.depth(),
                    "tail call rewrites frame"
                );
                match self.stack.rewrite(proc, args) {
                    // The frame loop in `run_frame` picks the call up
                    Ok(()) => Ok(Value::Nil),
                    Err((proc, args)) => self.call_procedure(proc, args),
                }
            }
            Value::Proc(proc) => self.call_procedure(proc, args),
            other => Err(Error::NotProcedure(other.to_string())),
        }
    }

    /// Non-tail call: push a frame, run it, pop it whatever the outcome
    fn call_procedure(&mut self, proc: Rc<Procedure>, args: Vec<Value>) -> Result<Value, Error> {
        if self.stack.depth() >= self.config.max_call_depth {
            return Err(Error::CallDepthExceeded(self.config.max_call_depth));
        }

        self.stack.push(Rc::clone(&proc), args.clone());
        trace!(procedure = %procedure_name(&proc), depth = self.stack.depth(), "push frame");
        let result = self.run_frame(proc, args);
        self.stack.pop();
        trace!(depth = self.stack.depth(), "pop frame");
        result
    }

    /// Run the body of the top frame until it finishes without being rewritten
    fn run_frame(&mut self, mut proc: Rc<Procedure>, mut args: Vec<Value>) -> Result<Value, Error> {
        loop {
            let lambda = Rc::clone(&proc.lambda);
            if lambda.params.len() != args.len() {
                return Err(Error::arity_mismatch(
                    procedure_name(&proc),
                    lambda.params.len(),
                    args.len(),
                ));
            }

            let scope = Scope::with_parent(&proc.env);
            for (param, arg) in lambda.params.iter().zip(args) {
                scope.insert(*param, arg);
            }

            let result = self.eval_sequence(&lambda.body, &scope, true)?;

            match self.stack.take_rewrite() {
                Some((next, next_args)) => {
                    proc = next;
                    args = next_args;
                }
                None => return Ok(result),
            }
        }
    }

    /// Evaluate a body, returning the value of its final expression.
    /// Only that final expression may be a tail call, and only when `tail` is set.
    fn eval_sequence(&mut self, body: &[Expr], env: &Env, tail: bool) -> Result<Value, Error> {
        let saved_frame_last = self.stack.set_last(tail);
        let saved_last = self.last;

        let mut result = Value::Nil;
        let final_index = body.len().saturating_sub(1);
        for (i, expr) in body.iter().enumerate() {
            self.last = i == final_index;
            result = self.eval_expr(expr, env)?;
        }

        if let Some(frame_last) = saved_frame_last {
            self.stack.set_last(frame_last);
        }
        self.last = saved_last;
        Ok(result)
    }

    fn eval_define(&mut self, ident: Symbol, value: &Expr, env: &Env) -> Result<Value, Error> {
        self.last = false;
        let value = self.eval_expr(value, env)?;
        if let Value::Proc(proc) = &value {
            proc.adopt_name(ident);
        }
        env.insert(ident, value);
        Ok(Value::Nil)
    }

    fn eval_set(&mut self, ident: Symbol, value: &Expr, env: &Env) -> Result<Value, Error> {
        self.last = false;
        let value = self.eval_expr(value, env)?;
        let proc = match &value {
            Value::Proc(proc) => Some(Rc::clone(proc)),
            _ => None,
        };
        if !env.assign(ident, value) {
            return Err(Error::Unbound(ident.name()));
        }
        if let Some(proc) = proc {
            proc.adopt_name(ident);
        }
        Ok(Value::Nil)
    }

    fn eval_cond(&mut self, branches: &[Branch], env: &Env) -> Result<Value, Error> {
        let tail = self.take_tail_position();
        for branch in branches {
            if let Guard::Test(test) = &branch.guard {
                match self.eval_expr(test, env)? {
                    Value::Bool(true) => {}
                    Value::Bool(false) => continue,
                    other => return Err(Error::ConditionType(other.to_string())),
                }
            }
            let scope = Scope::with_parent(env);
            return self.eval_sequence(&branch.body, &scope, tail);
        }
        Ok(Value::Nil)
    }
}

fn procedure_name(proc: &Procedure) -> String {
    proc.name()
        .map_or_else(|| "anonymous procedure".to_owned(), Symbol::name)
}

/// Convert quoted syntax to data without evaluating anything
fn quote(datum: &Expr) -> Result<Value, Error> {
    match datum {
        Expr::Bool(b) => Ok(Value::Bool(*b)),
        Expr::Int(n) => Ok(Value::Int(*n)),
        Expr::Ident(name) => Ok(Value::Symbol(*name)),
        Expr::List(items) => {
            let items = items.iter().map(quote).collect::<Result<Vec<_>, _>>()?;
            Ok(Value::list(items))
        }
        Expr::Quote(inner) => Ok(Value::list([Value::Symbol(intern("quote")), quote(inner)?])),
        other => Err(Error::Unquotable(other.to_string())),
    }
}

#[cfg(test)]
#[expect(clippy::unwrap_used)] // test code OK
mod tests {
    use super::*;
    use crate::Error;
    use crate::ast::{ident, int};
    use crate::scheme::parse_scheme;
    use crate::value::sym;

    /// Test result variants for comprehensive testing
    #[derive(Debug)]
    enum TestResult {
        EvalResult(Value),           // Evaluation should succeed with this value
        SpecificError(&'static str), // Evaluation should fail with error containing this string
        Error,                       // Evaluation should fail (any error)
    }
    use TestResult::*;

    /// Test environment containing test cases that share state
    struct TestEnvironment(Vec<(&'static str, TestResult)>);

    fn val<T: Into<Value>>(value: T) -> Value {
        value.into()
    }

    /// Micro-helper for success cases in comprehensive tests
    fn success<T: Into<Value>>(value: T) -> TestResult {
        EvalResult(val(value))
    }

    /// Macro for setup expressions that evaluate to Nil (like define)
    macro_rules! test_setup {
        ($expr:expr) => {
            ($expr, EvalResult(Value::Nil))
        };
    }

    /// Run tests in isolated evaluators with shared state
    fn run_tests_in_environment(config: EvalConfig, test_environments: Vec<TestEnvironment>) {
        for (env_idx, TestEnvironment(test_cases)) in test_environments.iter().enumerate() {
            let mut evaluator = Evaluator::with_config(config);

            for (test_idx, (input, expected)) in test_cases.iter().enumerate() {
                let test_id = format!("Environment #{} test #{}", env_idx + 1, test_idx + 1);
                execute_test_case(input, expected, &mut evaluator, &test_id);
            }
        }
    }

    /// Execute a single test case with detailed error reporting
    fn execute_test_case(
        input: &str,
        expected: &TestResult,
        evaluator: &mut Evaluator,
        test_id: &str,
    ) {
        let expr = match parse_scheme(input).and_then(|raw| expand(&raw)) {
            Ok(expr) => expr,
            Err(err) => {
                panic!("{test_id}: unexpected read error for '{input}': {err:?}");
            }
        };

        let result = evaluator.eval(&expr);
        assert_eq!(
            evaluator.call_depth(),
            0,
            "{test_id}: call stack not empty after '{input}'"
        );

        match (result, expected) {
            (Ok(actual), EvalResult(expected_val)) => {
                assert_eq!(
                    actual, *expected_val,
                    "{test_id}: unexpected value for '{input}'"
                );
            }
            (Err(_), Error) => {} // Expected generic error
            (Err(e), SpecificError(expected_text)) => {
                let error_msg = format!("{e}");
                assert!(
                    error_msg.contains(expected_text),
                    "{test_id}: error should contain '{expected_text}', got: {error_msg}"
                );
            }
            (Ok(actual), Error) => {
                panic!("{test_id}: expected error for '{input}', got {actual:?}");
            }
            (Ok(actual), SpecificError(expected_text)) => {
                panic!("{test_id}: expected error containing '{expected_text}', got {actual:?}");
            }
            (Err(err), EvalResult(expected_val)) => {
                panic!("{test_id}: expected {expected_val:?} for '{input}', got error {err:?}");
            }
        }
    }

    /// Simplified test runner, one fresh evaluator per case
    fn run_comprehensive_tests(test_cases: Vec<(&str, TestResult)>) {
        for (i, (input, expected)) in test_cases.iter().enumerate() {
            let mut evaluator = Evaluator::new();
            let test_id = format!("#{}", i + 1);
            execute_test_case(input, expected, &mut evaluator, &test_id);
        }
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_comprehensive_operations_data_driven() {
        let test_cases = vec![
            // === SELF-EVALUATING FORMS ===
            ("42", success(42)),
            ("-271", success(-271)),
            ("9223372036854775807", success(i64::MAX)),
            ("true", success(true)),
            ("#f", success(false)),
            // === ARITHMETIC ===
            ("(+ 1 2 3)", success(6)),
            ("(+)", success(0)),
            ("(*)", success(1)),
            ("(- 10)", success(-10)),
            ("(- 10 3 2)", success(5)),
            ("(/ 20 2 5)", success(2)),
            ("(/ 1)", success(1)),
            ("(% 17 5)", success(2)),
            ("(+ (* 2 3) (- 8 2))", success(12)),
            ("(+ 9223372036854775807 1)", success(i64::MIN)), // Wraps
            ("(- (+ 9223372036854775807 5) 5)", success(i64::MAX)),
            ("(+ 7 -3)", success(4)),
            ("(+ -3 7)", success(4)),
            // === COMPARISON AND LOGIC ===
            ("(< 1 2 3)", success(true)),
            ("(= 1 1 2)", success(false)),
            ("(>= 3 3 1)", success(true)),
            ("(&& true (! false))", success(true)),
            ("(|| false false)", success(false)),
            ("(&&)", success(true)),
            // === QUOTE ===
            ("(quote a)", success(sym("a"))),
            ("'a", success(sym("a"))),
            ("'42", success(42)),
            ("'(1 2 3)", success(vec![1, 2, 3])),
            ("'()", EvalResult(Value::Nil)),
            ("'(+ 1 2)", success(vec![sym("+"), val(1), val(2)])),
            (
                "(quote (a (quote b)))",
                success(vec![sym("a"), val(vec![sym("quote"), sym("b")])]),
            ),
            ("''a", success(vec![sym("quote"), sym("a")])),
            ("'(define x 1)", success(vec![sym("define"), sym("x"), val(1)])),
            ("(car '(a b))", success(sym("a"))),
            ("(cdr '(a b))", success(vec![sym("b")])),
            ("(car (cdr (car (cdr '(a (quote b))))))", success(sym("b"))),
            // === LISTS AND EQUALITY ===
            ("(cons 1 2)", EvalResult(Value::cons(val(1), val(2)))),
            ("(cons 1 '(2))", success(vec![1, 2])),
            ("(list 1 (list 2) 3)", success(vec![val(1), val(vec![2]), val(3)])),
            ("(null? (list))", success(true)),
            ("(null? '(1))", success(false)),
            ("(eq? 'a 'a)", success(true)),
            ("(eq? '(1 2) '(1 2))", success(false)),
            ("(equal? '(1 2) '(1 2))", success(true)),
            ("(equal? '(1 (2)) '(1 (3)))", success(false)),
            // === COND ===
            ("(cond (false 1))", EvalResult(Value::Nil)),
            ("(cond ((= 1 2) 1) (else 2))", success(2)),
            ("(cond ((= 1 1) 1) (else 2))", success(1)),
            ("(cond (false 1) (true 2 3))", success(3)),
            ("(cond (else 1 2 3))", success(3)),
            (
                "(cond (1 2))",
                SpecificError("condition must be boolean, got 1"),
            ),
            ("(cond ('() 2))", SpecificError("condition must be boolean")),
            // === LAMBDA ===
            ("((lambda (x y) (+ x y)) 3 4)", success(7)),
            ("((lambda () 1 2 3))", success(3)),
            ("(((lambda (x) (lambda (y) (+ x y))) 10) 5)", success(15)),
            ("((lambda (f x) (f x x)) + 5)", success(10)),
            // === ERRORS ===
            (
                "x",
                SpecificError("identifier 'x' is not bound for any value"),
            ),
            ("(set! x 1)", SpecificError("identifier 'x' is not bound")),
            ("()", SpecificError("missing procedure expression")),
            ("(1 2)", SpecificError("not a procedure: 1")),
            ("('a 2)", SpecificError("not a procedure: a")),
            ("((lambda (x) x))", SpecificError("arity mismatch")),
            ("((lambda (x) x) 1 2)", SpecificError("arity mismatch")),
            ("(+ 1 true)", SpecificError("+: type mismatch")),
            ("(! 1 2)", SpecificError("!: arity mismatch")),
            ("(/ 1 0)", SpecificError("/: division by zero")),
            ("(% 1 0)", SpecificError("%: division by zero")),
            ("(car (list))", SpecificError("car: type mismatch")),
            ("(+ 1 (car 2) undefined)", SpecificError("car")), // Operands short-circuit in order
        ];

        run_comprehensive_tests(test_cases);
    }

    #[test]
    #[expect(clippy::too_many_lines)] // Comprehensive test coverage is intentionally thorough
    fn test_environment_sensitive_operations() {
        let environment_test_cases = vec![
            // === DEFINE AND LOOKUP ===
            TestEnvironment(vec![
                test_setup!("(define x 42)"),
                ("x", success(42)),
                ("(+ x 8)", success(50)),
                test_setup!("(define x 100)"), // Last definition wins
                ("x", success(100)),
                ("y", Error),
            ]),
            // === BUILTINS AS VALUES ===
            TestEnvironment(vec![
                test_setup!("(define my-add +)"),
                ("(my-add 10 20)", success(30)),
                test_setup!("(define apply2 (lambda (f a b) (f a b)))"),
                ("(apply2 + 1 2)", success(3)), // Builtin in tail position
                ("(apply2 cons 1 2)", EvalResult(Value::cons(val(1), val(2)))),
                ("(eq? my-add +)", success(true)),
            ]),
            // === SET! ===
            TestEnvironment(vec![
                test_setup!("(define counter 0)"),
                test_setup!("(define inc (lambda () (set! counter (+ counter 1)) counter))"),
                ("(inc)", success(1)),
                ("(inc)", success(2)),
                test_setup!("(define peek (lambda () counter))"),
                ("(peek)", success(2)),
                ("counter", success(2)),
                // set! on a parameter only touches the call's scope
                test_setup!("(define g (lambda (counter) (set! counter 5) counter))"),
                ("(g 1)", success(5)),
                ("counter", success(2)),
                ("(set! undefined-name 1)", SpecificError("not bound")),
                ("undefined-name", Error),
            ]),
            // === CLOSURES SHARE THEIR SCOPE ===
            TestEnvironment(vec![
                test_setup!("(define y 100)"),
                test_setup!("(define g (lambda () y))"),
                test_setup!("(define y 200)"),
                ("(g)", success(200)),
                test_setup!("(define make-adder (lambda (n) (lambda (x) (+ x n))))"),
                test_setup!("(define add5 (make-adder 5))"),
                ("(add5 3)", success(8)),
                ("((make-adder 1) 1)", success(2)),
                test_setup!("(define f (lambda (x) (lambda (x) (* x 2))))"), // Shadowing
                ("((f 10) 3)", success(6)),
            ]),
            // === MESSAGE-PASSING OBJECT ===
            TestEnvironment(vec![
                test_setup!(
                    "(define NewProfile
                       (lambda (name age)
                         (define get-age (lambda () age))
                         (define inc-age (lambda () (set! age (+ age 1))))
                         (lambda (msg)
                           (cond ((eq? msg 'name) name)
                                 ((eq? msg 'age) (get-age))
                                 ((eq? msg 'inc) (inc-age))
                                 (else false)))))"
                ),
                test_setup!("(define alice (NewProfile 'alice 30))"),
                test_setup!("(define bob (NewProfile 'bob 40))"),
                ("(alice 'age)", success(30)),
                ("(alice 'inc)", EvalResult(Value::Nil)),
                ("(alice 'inc)", EvalResult(Value::Nil)),
                ("(alice 'age)", success(32)),
                ("(bob 'age)", success(40)),
                ("(alice 'name)", success(sym("alice"))),
                ("(alice 'other)", success(false)),
            ]),
            // === COND BODIES GET A FRESH SCOPE ===
            TestEnvironment(vec![
                test_setup!("(define x 1)"),
                ("(cond (true (define x 2) x))", success(2)),
                ("x", success(1)),
                ("(cond (else (set! x 3) x))", success(3)),
                ("x", success(3)),
            ]),
            // === CHURCH NUMERALS ===
            TestEnvironment(vec![
                test_setup!("(define zero (lambda (f) (lambda (x) x)))"),
                test_setup!("(define succ (lambda (n) (lambda (f) (lambda (x) (f ((n f) x))))))"),
                test_setup!(
                    "(define add (lambda (m n) (lambda (f) (lambda (x) ((m f) ((n f) x))))))"
                ),
                test_setup!("(define mul (lambda (m n) (lambda (f) (m (n f)))))"),
                test_setup!("(define to-int (lambda (n) ((n (lambda (x) (+ x 1))) 0)))"),
                test_setup!("(define three (succ (succ (succ zero))))"),
                ("(to-int zero)", success(0)),
                ("(to-int three)", success(3)),
                ("(to-int (add three three))", success(6)),
                ("(to-int (mul three (succ three)))", success(12)),
            ]),
            // === NON-TAIL RECURSION ===
            TestEnvironment(vec![
                test_setup!(
                    "(define fib (lambda (n) (cond ((< n 2) n) (else (+ (fib (- n 1)) (fib (- n 2)))))))"
                ),
                ("(fib 0)", success(0)),
                ("(fib 1)", success(1)),
                ("(fib 15)", success(610)),
                test_setup!(
                    "(define countdown (lambda (n) (cond ((= n 0) (list)) (else (cons n (countdown (- n 1)))))))"
                ),
                ("(countdown 3)", success(vec![3, 2, 1])),
            ]),
            // === CALLS IN OPERAND POSITION ARE NOT TAIL CALLS ===
            TestEnvironment(vec![
                test_setup!("(define id (lambda (x) x))"),
                test_setup!("(define h (lambda (a) (+ (id a) (id 2))))"),
                ("(h 1)", success(3)),
                test_setup!("(define k (lambda (a) (list (id a) (id 2) (id 3))))"),
                ("(k 1)", success(vec![1, 2, 3])),
                test_setup!("(define d (lambda (a) (define b (id a)) (+ b 1)))"),
                ("(d 1)", success(2)),
                test_setup!("(define c (lambda (a) (cond ((= (id a) 1) (id 10)) (else 0))))"),
                ("(c 1)", success(10)),
                ("(c 2)", success(0)),
            ]),
            // === ERRORS DO NOT CORRUPT STATE ===
            TestEnvironment(vec![
                test_setup!("(define x 1)"),
                test_setup!(
                    "(define bad (lambda (n) (cond ((= n 0) (car (list))) (else (+ 1 (bad (- n 1)))))))"
                ),
                ("(bad 10)", SpecificError("car: type mismatch")),
                ("x", success(1)),
                ("(undefined-proc x)", SpecificError("undefined-proc")),
                ("(+ x 1)", success(2)),
                // Arity is rechecked when a tail call re-enters the frame loop
                test_setup!("(define one (lambda (a) a))"),
                test_setup!("(define call-one (lambda () (one 1 2)))"),
                ("(call-one)", SpecificError("one: arity mismatch, expected 1")),
                ("(one 7)", success(7)),
            ]),
        ];

        run_tests_in_environment(EvalConfig::default(), environment_test_cases);
    }

    #[test]
    fn test_tail_recursion_runs_in_constant_stack() {
        let sum_and_fac = vec![TestEnvironment(vec![
            test_setup!(
                "(define sum
                   (lambda (n)
                     (define iter
                       (lambda (i acc)
                         (cond ((= i 0) acc)
                               (else (iter (- i 1) (+ acc i))))))
                     (iter n 0)))"
            ),
            test_setup!(
                "(define fac
                   (lambda (n)
                     (define iter
                       (lambda (i acc)
                         (cond ((= i 0) acc)
                               (else (iter (- i 1) (* acc i))))))
                     (iter n 1)))"
            ),
            ("(sum 10000)", success(50_005_000)),
            ("(sum 100000)", success(5_000_050_000_i64)),
            ("(fac 10)", success(3_628_800)),
            ("(fac 20)", success(2_432_902_008_176_640_000_i64)),
            // Mutual recursion through two procedures
            test_setup!("(define even? (lambda (n) (cond ((= n 0) true) (else (odd? (- n 1))))))"),
            test_setup!("(define odd? (lambda (n) (cond ((= n 0) false) (else (even? (- n 1))))))"),
            ("(even? 10000)", success(true)),
            ("(odd? 10001)", success(true)),
            ("(even? 10001)", success(false)),
        ])];

        // A depth limit far below the iteration counts proves frames are reused
        let config = EvalConfig {
            tail_calls: true,
            max_call_depth: 16,
        };
        run_tests_in_environment(config, sum_and_fac);
    }

    #[test]
    fn test_call_depth_limit() {
        let sum = "(define sum
                     (lambda (n)
                       (define iter
                         (lambda (i acc)
                           (cond ((= i 0) acc)
                                 (else (iter (- i 1) (+ acc i))))))
                       (iter n 0)))";

        // Without tail calls every iteration holds a frame
        let no_tail_calls = EvalConfig {
            tail_calls: false,
            max_call_depth: 50,
        };
        run_tests_in_environment(
            no_tail_calls,
            vec![TestEnvironment(vec![
                test_setup!(sum),
                ("(sum 10)", success(55)),
                ("(sum 100)", SpecificError("call depth limit exceeded (max: 50 frames)")),
                ("(sum 20)", success(210)),
            ])],
        );

        // Non-tail recursion is bounded even with tail calls enabled
        let shallow = EvalConfig {
            tail_calls: true,
            max_call_depth: 64,
        };
        run_tests_in_environment(
            shallow,
            vec![TestEnvironment(vec![
                test_setup!(
                    "(define deep (lambda (n) (cond ((= n 0) 0) (else (+ 1 (deep (- n 1)))))))"
                ),
                ("(deep 50)", success(50)),
                ("(deep 100)", SpecificError("call depth limit exceeded")),
                ("(deep 60)", success(60)),
                test_setup!(sum),
                ("(sum 1000)", success(500_500)),
            ])],
        );
    }

    #[test]
    fn test_default_depth_limit_fits_main_thread_stack() {
        const MAIN_THREAD_STACK: usize = 8 * 1024 * 1024;

        let worker = std::thread::Builder::new()
            .stack_size(MAIN_THREAD_STACK)
            .spawn(|| {
                let mut evaluator = Evaluator::new();
                assert_eq!(evaluator.config().max_call_depth, MAX_CALL_DEPTH);
                evaluator
                    .eval_source(
                        "(define deep (lambda (n) (cond ((= n 0) 0) (else (+ 1 (deep (- n 1)))))))",
                    )
                    .unwrap();

                // (deep n) holds n + 1 frames at its deepest point
                let deepest = MAX_CALL_DEPTH - 1;
                assert_eq!(
                    evaluator.eval_source(&format!("(deep {deepest})")).unwrap(),
                    Value::Int(i64::try_from(deepest).unwrap())
                );
                assert_eq!(
                    evaluator.eval_source(&format!("(deep {})", MAX_CALL_DEPTH + 1)),
                    Err(Error::CallDepthExceeded(MAX_CALL_DEPTH))
                );
                assert_eq!(evaluator.call_depth(), 0);
            })
            .unwrap();
        worker.join().unwrap();
    }

    #[test]
    fn test_procedure_naming() {
        let mut evaluator = Evaluator::new();
        let mut show = |source: &str| evaluator.eval_source(source).unwrap().to_string();

        assert_eq!(show("(lambda (x) x)"), "<procedure>");
        assert_eq!(show("+"), "<procedure +>");
        assert_eq!(show("(define plus +) plus"), "<procedure +>");

        assert_eq!(show("(define f (lambda (x) x)) f"), "<procedure f>");
        // Redefinition does not rename an already named procedure
        assert_eq!(show("(define g f) g"), "<procedure f>");
        assert_eq!(show("(define f (lambda (y) y)) f"), "<procedure f>");
        assert_eq!(show("g"), "<procedure f>");

        assert_eq!(show("(set! g (lambda () 1)) g"), "<procedure g>");
        assert_eq!(show("(define make (lambda () (lambda () 1))) (make)"), "<procedure>");
        assert_eq!(show("(define made (make)) made"), "<procedure made>");
    }

    #[test]
    fn test_eval_source() {
        let mut evaluator = Evaluator::new();
        assert_eq!(evaluator.eval_source("").unwrap(), Value::Nil);
        assert_eq!(
            evaluator
                .eval_source("(define x 1) (define y 2) (+ x y)")
                .unwrap(),
            Value::Int(3)
        );
        assert_eq!(
            evaluator
                .eval_source("; leading comment\n(* x 10) ; trailing")
                .unwrap(),
            Value::Int(10)
        );

        assert!(matches!(
            evaluator.eval_source("(+ 1 2"),
            Err(Error::Parse(_))
        ));
        assert!(matches!(
            evaluator.eval_source("(define 1 2)"),
            Err(Error::Syntax { form: "define", .. })
        ));

        // Evaluation stops at the first failing expression
        assert!(evaluator.eval_source("(define z 1) (car 1) (define z 2)").is_err());
        assert_eq!(evaluator.eval_source("z").unwrap(), Value::Int(1));

        let no_comments = ParseConfig {
            handle_comments: false,
        };
        assert!(evaluator.eval_source_with("; x", no_comments).is_err());
    }

    #[test]
    fn test_eval_expanded_trees_directly() {
        let mut evaluator = Evaluator::new();
        let expr = Expr::Define {
            ident: intern("answer"),
            value: Box::new(int(42)),
        };
        assert_eq!(evaluator.eval(&expr).unwrap(), Value::Nil);
        assert_eq!(evaluator.eval(&ident("answer")).unwrap(), Value::Int(42));
        assert_eq!(
            evaluator.root().lookup(intern("answer")),
            Some(Value::Int(42))
        );

        // Typed forms never appear inside quoted data produced by the reader
        let quoted_define = Expr::Quote(Box::new(expr));
        assert!(matches!(
            evaluator.eval(&quoted_define),
            Err(Error::Unquotable(_))
        ));
    }
}
