//! Compile-time tests for the Component derive macro.
//!
//! Every file under `tests/ui/pass_*.rs` must expand and type-check for each
//! storage strategy it exercises. Every `tests/ui/fail_*.rs` must be rejected
//! with the diagnostic recorded next to it.

#[test]
fn test_derive_cases() {
    let t = trybuild::TestCases::new();
    t.compile_fail("tests/ui/fail_*.rs");
    t.pass("tests/ui/pass_*.rs");
}
