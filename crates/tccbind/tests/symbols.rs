// Host symbol injection and lookup after relocation

mod common;

use std::ffi::{c_int, c_void};
use std::ptr::NonNull;
use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

use common::{fake_toolchain, FakeCompiler};
use tccbind::{BindError, BindResult, ErrorKind, Finalized, InjectError, OutputType, Stage, SymbolKind};

type BinaryFn = extern "C" fn(c_int, c_int) -> c_int;
type UnaryFn = extern "C" fn(c_int) -> c_int;

extern "C" fn add(a: c_int, b: c_int) -> c_int {
    a + b
}

extern "C" fn sub(a: c_int, b: c_int) -> c_int {
    a - b
}

fn injection_error(result: BindResult<()>) -> InjectError {
    match result {
        Err(BindError::Injection(err)) => err,
        other => panic!("expected an injection error, got {other:?}"),
    }
}

static FOO_ADD: AtomicUsize = AtomicUsize::new(0);

/// Stands in for `int foo(int n) { return add(n, n); }` compiled against an injected
/// `add`.
extern "C" fn compiled_foo(n: c_int) -> c_int {
    let add: BinaryFn = unsafe { std::mem::transmute::<usize, BinaryFn>(FOO_ADD.load(Ordering::SeqCst)) };
    add(n, n)
}

#[test]
fn test_compiled_code_calls_injected_function() -> BindResult<()> {
    let fake = FakeCompiler::new()
        .with_export("foo", compiled_foo as *const c_void)
        .with_import_slot("add", &FOO_ADD)
        .into_table();
    let mut ctx = fake_toolchain(&fake).context()?;

    ctx.compile_string("int add(int, int);\n// import add\nint foo(int n) { return add(n, n); }\n// export foo\n")?;
    ctx.inject_function("add", add as BinaryFn)?;
    ctx.relocate()?;

    let foo: UnaryFn = unsafe { ctx.resolve_function("foo")? }.expect("foo is defined");
    assert_eq!(foo(21), 42);
    assert_eq!(ctx.stage(), Stage::Finalized(Finalized::Resolved));
    Ok(())
}

static COUNTER_SLOT: AtomicUsize = AtomicUsize::new(0);

extern "C" fn compiled_bump() -> c_int {
    let counter = COUNTER_SLOT.load(Ordering::SeqCst) as *const AtomicI32;
    unsafe { &*counter }.fetch_add(1, Ordering::SeqCst) + 1
}

#[test]
fn test_injected_data_is_shared_with_compiled_code() -> BindResult<()> {
    let counter = AtomicI32::new(10);
    let fake = FakeCompiler::new()
        .with_export("bump", compiled_bump as *const c_void)
        .with_import_slot("counter", &COUNTER_SLOT)
        .into_table();
    {
        let mut ctx = fake_toolchain(&fake).context()?;
        ctx.inject_data("counter", &counter)?;
        ctx.compile_string("extern int counter;\n// import counter\nint bump(void) { return ++counter; }\n// export bump\n")?;
        ctx.relocate()?;

        let bump: extern "C" fn() -> c_int = unsafe { ctx.resolve_function("bump")? }.expect("bump is defined");
        assert_eq!(bump(), 11);
        assert_eq!(bump(), 12);

        let symbol = ctx.injected_symbol("counter").expect("recorded");
        assert_eq!(symbol.kind(), SymbolKind::Data);
        assert_eq!(symbol.address(), (&counter as *const AtomicI32).cast::<c_void>());
    }
    assert_eq!(counter.load(Ordering::SeqCst), 12);
    Ok(())
}

#[test]
fn test_injected_symbols_resolve_through_get_symbol() -> BindResult<()> {
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    ctx.inject_function("add", add as BinaryFn)?;
    ctx.compile_string("int x;\n")?;
    ctx.relocate()?;

    let address = ctx.get_symbol("add")?.map(NonNull::as_ptr);
    assert_eq!(address, Some(add as *mut c_void));
    assert_eq!(ctx.get_symbol("not_defined_anywhere")?, None);
    Ok(())
}

#[test]
fn test_injection_is_sealed_after_relocation() -> BindResult<()> {
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    ctx.compile_string("int x;\n")?;
    ctx.relocate()?;

    let err = injection_error(ctx.inject_function("add", add as BinaryFn));
    assert!(matches!(err, InjectError::Sealed { stage: Stage::Relocated, .. }));
    assert_eq!(fake.count("tcc_add_symbol"), 0);
    assert!(ctx.injected_symbols().is_empty());
    Ok(())
}

#[test]
fn test_injection_is_sealed_after_emission() -> BindResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    ctx.set_output_type(OutputType::DynamicLibrary)?;
    ctx.compile_string("int x;\n")?;
    ctx.output_file(dir.path().join("libx.so"))?;

    static VALUE: i32 = 7;
    let err = injection_error(ctx.inject_data("value", &VALUE));
    assert!(matches!(err, InjectError::Sealed { .. }));
    Ok(())
}

#[test]
fn test_injection_before_and_after_compile_is_allowed() -> BindResult<()> {
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    ctx.inject_function("add", add as BinaryFn)?;
    assert_eq!(ctx.stage(), Stage::Created);
    ctx.compile_string("int x;\n")?;
    ctx.inject_function("sub", sub as BinaryFn)?;
    assert_eq!(ctx.stage(), Stage::Compiled);

    let names: Vec<&str> = ctx.injected_symbols().iter().map(|s| s.name()).collect();
    assert_eq!(names, ["add", "sub"]);
    Ok(())
}

#[test]
fn test_duplicate_injection_replaces_and_is_forwarded() -> BindResult<()> {
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    ctx.inject_function("op", add as BinaryFn)?;
    ctx.inject_function("other", sub as BinaryFn)?;
    ctx.inject_function("op", sub as BinaryFn)?;

    assert_eq!(fake.count("tcc_add_symbol"), 3);
    let symbols = ctx.injected_symbols();
    assert_eq!(symbols.len(), 2);
    assert_eq!(symbols[0].name(), "op");
    assert_eq!(symbols[0].address(), sub as *const c_void);
    Ok(())
}

#[test]
fn test_invalid_and_rejected_names() -> BindResult<()> {
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;

    let err = injection_error(ctx.inject_function("", add as BinaryFn));
    assert!(matches!(err, InjectError::InvalidName { .. }));
    let err = injection_error(ctx.inject_function("a\0b", add as BinaryFn));
    assert!(matches!(err, InjectError::InvalidName { .. }));
    assert_eq!(fake.count("tcc_add_symbol"), 0);

    let err = injection_error(ctx.inject_function("__reserved", add as BinaryFn));
    assert!(matches!(err, InjectError::Rejected { status: -1, .. }));
    assert!(ctx.injected_symbols().is_empty());
    Ok(())
}

#[test]
fn test_raw_injection_records_kind() -> BindResult<()> {
    static TABLE: [u8; 4] = [1, 2, 3, 4];
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    unsafe { ctx.inject_raw("table", SymbolKind::Data, TABLE.as_ptr().cast())? };

    let symbol = ctx.injected_symbol("table").expect("recorded");
    assert_eq!(symbol.kind(), SymbolKind::Data);
    assert_eq!(symbol.address(), TABLE.as_ptr().cast::<c_void>());
    Ok(())
}

#[test]
fn test_relocation_into_caller_memory() -> BindResult<()> {
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    ctx.compile_string("int x;\n")?;

    let size = ctx.relocation_size()?;
    let mut buffer = vec![0u8; size];
    let memory = NonNull::new(buffer.as_mut_ptr()).expect("vec memory");
    unsafe { ctx.relocate_into(memory)? };
    assert_eq!(ctx.stage(), Stage::Relocated);
    assert_eq!(fake.count("tcc_relocate"), 2);
    assert!(fake.calls().contains(&"tcc_relocate(memory)".to_owned()));
    Ok(())
}

#[cfg(all(windows, target_arch = "x86"))]
#[test]
fn test_mismatched_convention_is_refused() -> BindResult<()> {
    extern "system" fn stdcall_add(a: c_int, b: c_int) -> c_int {
        a + b
    }
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    let err = injection_error(ctx.inject_function("add", stdcall_add as extern "system" fn(c_int, c_int) -> c_int));
    assert!(matches!(err, InjectError::ConventionMismatch { .. }));
    Ok(())
}

#[test]
fn test_either_convention_is_accepted_where_they_coincide() -> BindResult<()> {
    if cfg!(all(windows, target_arch = "x86")) {
        return Ok(());
    }
    extern "system" fn system_add(a: c_int, b: c_int) -> c_int {
        a + b
    }
    let fake = FakeCompiler::new().into_table();
    let mut ctx = fake_toolchain(&fake).context()?;
    ctx.inject_function("c_add", add as BinaryFn)?;
    ctx.inject_function("system_add", system_add as extern "system" fn(c_int, c_int) -> c_int)?;
    assert_eq!(ctx.injected_symbols().len(), 2);
    let err = ctx.inject_function("", add as BinaryFn).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Injection);
    Ok(())
}
