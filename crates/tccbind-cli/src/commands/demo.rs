use std::ffi::{c_char, c_int, CStr};

use tccbind::{OutputType, Toolchain};

use super::{open_context, CompileArgs};
use crate::error::CliError;

const DEMO_SOURCE: &str = r#"
int add(int a, int b);
void hello(const char *msg);

int foo(int n)
{
    hello("Hello from compiled code");
    return add(n, n);
}
"#;

extern "C" fn add(a: c_int, b: c_int) -> c_int {
    a + b
}

extern "C" fn hello(message: *const c_char) {
    if message.is_null() {
        return;
    }
    let text = unsafe { CStr::from_ptr(message) };
    println!("{}", text.to_string_lossy());
}

/// Injects `add` and `hello`, compiles a unit calling both, then calls `foo(32)`.
pub fn handle_demo(toolchain: &Toolchain, opts: &CompileArgs) -> Result<(), CliError> {
    let mut ctx = open_context(toolchain, opts)?;
    ctx.set_output_type(OutputType::Memory)?;
    ctx.compile_string(DEMO_SOURCE)?;
    ctx.inject_function("add", add as extern "C" fn(c_int, c_int) -> c_int)?;
    ctx.inject_function("hello", hello as extern "C" fn(*const c_char))?;
    ctx.relocate()?;

    let foo: extern "C" fn(c_int) -> c_int = unsafe { ctx.resolve_function("foo")? }
        .ok_or_else(|| CliError::MissingSymbol { name: "foo".to_owned() })?;
    println!("foo(32) = {}", foo(32));
    Ok(())
}
