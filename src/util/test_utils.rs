use crate::{
    compiler,
    util::fmt::{Context, Show},
};

/// Each variant contains the input.
pub enum Test {
    /// A whole class.
    Class(&'static str),
    /// Class members, wrapped in `class Main { ... }`. The members start on
    /// the second line.
    Members(&'static str),
}

pub enum Assertion {
    VmOk(&'static str),
    ExpectedError(&'static str),
    ExpectedWarnings(&'static [&'static str]),
}

pub struct Outcome {
    pub vm: String,
    pub error: Option<String>,
    pub warnings: Vec<String>,
}

#[track_caller]
pub fn run_pipeline(test: Test) -> Outcome {
    let src = match test {
        Test::Class(input) => input.to_string(),
        Test::Members(input) => format!("class Main {{\n{input}\n}}\n"),
    };
    let ctx = Context { src: &src };
    let mut out = Vec::with_capacity(1024);

    let result = compiler::compile(&src, &mut out);
    let vm = String::from_utf8(out).expect("vm code is ascii");
    match result {
        Ok(report) => Outcome {
            vm,
            error: None,
            warnings: report
                .warnings
                .iter()
                .map(|w| format!("{:#}", w.display(&ctx)))
                .collect(),
        },
        Err(error) => Outcome {
            vm,
            error: Some(format!("{:#}", error.display(&ctx))),
            warnings: Vec::new(),
        },
    }
}

#[track_caller]
pub fn run_assertion(assertion: Assertion, outcome: &Outcome) {
    match assertion {
        Assertion::VmOk(expected_vm) => {
            ::pretty_assertions::assert_eq!(outcome.error, None);
            ::pretty_assertions::assert_eq!(outcome.vm.trim(), expected_vm.trim());
        }
        Assertion::ExpectedError(expected_error) => {
            ::pretty_assertions::assert_eq!(outcome.error.as_deref(), Some(expected_error));
        }
        Assertion::ExpectedWarnings(expected_warnings) => {
            ::pretty_assertions::assert_eq!(outcome.warnings, expected_warnings);
        }
    }
}

macro_rules! vm_tests {
    (
        $(
            fn $test_name:ident() {
                let $source_kind:ident = $source:expr;
                $($assertions_tt:tt)*
            }
        )*
    ) => {
        $(
            #[test]
            fn $test_name() {
                let test: crate::util::test_utils::Test =
                    vm_tests!(@@get_test($source_kind), $source);
                let outcome = crate::util::test_utils::run_pipeline(test);
                vm_tests!(@@expand_assertions, outcome, [$($assertions_tt)*]);
            }
        )*
    };

    (@@expand_assertions, $outcome:expr, []) => {};
    (@@expand_assertions, $outcome:expr, [
        let $assertion:ident = $assertion_expected:expr;
        $($rest_assertions_tt:tt)*
    ]) => {
        crate::util::test_utils::run_assertion(
            vm_tests!(@@assertion, $assertion, $assertion_expected),
            &$outcome,
        );
        vm_tests!(@@expand_assertions, $outcome, [$($rest_assertions_tt)*]);
    };

    (@@assertion, vm_ok, $expected:expr) => {
        crate::util::test_utils::Assertion::VmOk(::indoc::indoc! { $expected })
    };
    (@@assertion, expected_error, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedError($expected)
    };
    (@@assertion, expected_warnings, $expected:expr) => {
        crate::util::test_utils::Assertion::ExpectedWarnings($expected)
    };

    (@@get_test(class), $source:expr) => {
        crate::util::test_utils::Test::Class($source)
    };
    (@@get_test(members), $source:expr) => {
        crate::util::test_utils::Test::Members($source)
    };
}
pub(crate) use vm_tests;
