use devices::{Capture, ScriptState, Streams};
use nga::{Cell, Fault, FaultKind, Vm, VmConfig, asm::Assembler, dict};
use nga_cli::Shell;
use std::{cell::RefCell, path::Path, rc::Rc};

const TIB: Cell = 2000;
const NAME: Cell = 3000;

/// Builds a toy image whose `interpret` looks at the first character of each
/// token:
///
/// - `?` runs the not-found handler
/// - `>` includes the file named by the rest of the token
/// - `^` aborts
/// - anything else is pushed to the stack
///
/// Handlers drop their return address, so they return straight to the
/// caller of `interpret`.
fn assemble(headers: bool) -> Assembler {
    let mut a = Assembler::new();
    a.inst("liju").unwrap().reference("listener");
    a.org(11);

    a.label("interpret").unwrap();
    for (c, handler) in [('?', "nf"), ('>', "include"), ('^', "abort")] {
        a.inst("dufeli..").unwrap().data(c as Cell);
        a.inst("eqlicc..").unwrap().reference(handler);
    }
    a.inst("fere").unwrap();

    a.label("nf").unwrap();
    a.inst("podrdrre").unwrap();

    a.label("include").unwrap();
    a.inst("podrliad").unwrap().data(1);
    a.inst("liliii..").unwrap().data(2).data(5);
    a.inst("re").unwrap();

    a.label("abort").unwrap();
    a.inst("podrdrli").unwrap().data(8);
    a.inst("liiire..").unwrap().data(5);

    // Includes the file named at NAME, then pushes 42
    a.label("listener").unwrap();
    a.inst("lilili..").unwrap().data(NAME).data(2).data(5);
    a.inst("ii").unwrap();
    a.inst("lire").unwrap().data(42);

    a.label("startup").unwrap();
    a.inst("lire").unwrap().data(99);

    if headers {
        a.header_ref("interpret", "interpret", 0);
        a.header_ref("err:notfound", "nf", 0);
    } else {
        let interpret = a.address_of("interpret").unwrap();
        let nf = a.address_of("nf").unwrap();
        a.set(dict::INTERPRET, interpret).unwrap();
        a.set(dict::NOT_FOUND, nf).unwrap();
    }
    a.set(dict::TIB, TIB).unwrap();
    a
}

struct Harness {
    shell: Shell,
    out: Capture,
    script: Rc<RefCell<ScriptState>>,
}

impl Harness {
    fn new(a: &Assembler) -> Self {
        let image = a.finish().unwrap();
        let script = ScriptState::default().shared();
        let out = Capture::new();
        let streams = Streams {
            output: Box::new(out.clone()),
            input: Box::new(std::io::empty()),
        };
        let devices = devices::standard(streams, script.clone());
        let vm = Vm::new(VmConfig {
            image_size: 8192,
            ..VmConfig::default()
        });
        let mut shell =
            Shell::new(vm, devices, script.clone(), Box::new(out.clone()));
        shell.load_image(&nga::image::encode(&image)).unwrap();
        Self { shell, out, script }
    }

    fn stack(&self) -> Vec<Cell> {
        self.shell.vm().core().data().as_slice().to_vec()
    }
}

fn chars(s: &str) -> Vec<Cell> {
    s.chars().map(|c| c as Cell).collect()
}

fn write(dir: &Path, name: &str, text: &str) -> String {
    let path = dir.join(name);
    std::fs::write(&path, text).unwrap();
    path.display().to_string()
}

#[test]
fn interface_by_name() {
    let a = assemble(true);
    let h = Harness::new(&a);
    let iface = h.shell.interface();
    assert_eq!(iface.interpret, a.address_of("interpret").unwrap());
    assert_eq!(iface.not_found, a.address_of("nf").unwrap());
    assert_eq!(iface.tib, TIB);
    let head = h.shell.vm().fetch(dict::DICTIONARY).unwrap();
    assert_eq!(iface.dictionary, head);
    assert_ne!(iface.dictionary, 0);
}

#[test]
fn interface_from_cells() {
    let a = assemble(false);
    let h = Harness::new(&a);
    let iface = h.shell.interface();
    assert_eq!(iface.dictionary, 0);
    assert_eq!(iface.interpret, a.address_of("interpret").unwrap());
    assert_eq!(iface.not_found, a.address_of("nf").unwrap());
}

#[test]
fn evaluate() {
    let mut h = Harness::new(&assemble(true));
    h.shell.evaluate("abc").unwrap();
    h.shell.evaluate("").unwrap();
    h.shell.evaluate("z").unwrap();
    assert_eq!(h.stack(), chars("az"));
    assert_eq!(h.shell.vm().extract_string(TIB), "z");
    assert!(h.shell.vm().core().address().is_empty());
}

#[test]
fn word_not_found() {
    let mut h = Harness::new(&assemble(true));
    h.shell.evaluate("?huh").unwrap();
    assert_eq!(h.out.take_string(), "\nERROR: Word Not Found: `?huh`\n\n");
    assert!(h.stack().is_empty());

    h.shell.evaluate("ok").unwrap();
    assert_eq!(h.out.take_string(), "");
}

#[test]
fn blocks() {
    let dir = tempfile::tempdir().unwrap();
    let text = "# Title\n\
                prose is ignored\n\
                ~~~\n\
                ab  cd\n\
                ~~~\n\
                \n\
                ```\n\
                ef\n\
                ```\n";
    let path = write(dir.path(), "lib.md", text);

    let mut h = Harness::new(&assemble(true));
    h.shell.include(Path::new(&path), false).unwrap();
    assert_eq!(h.stack(), chars("ac"));
    {
        let s = h.script.borrow();
        assert_eq!(s.line, 4);
        assert_eq!(s.line_text, "ab  cd");
        assert!(s.sources.is_empty());
    }

    let mut h = Harness::new(&assemble(true));
    h.shell.include(Path::new(&path), true).unwrap();
    assert_eq!(h.stack(), chars("ace"));
}

#[test]
fn custom_fences() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "page.html", "<code>\nxy\n</code>\n~~~ z ~~~");
    let mut h = Harness::new(&assemble(true));
    h.shell.set_fences(nga_cli::source::Fences {
        code_start: "<code>".to_owned(),
        code_end: "</code>".to_owned(),
        ..Default::default()
    });
    h.shell.include(Path::new(&path), false).unwrap();
    assert_eq!(h.stack(), chars("x"));
}

#[test]
fn no_blocks() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "notes.txt", "just some text\n");
    let mut h = Harness::new(&assemble(true));
    h.shell.include(Path::new(&path), false).unwrap();
    assert!(h.stack().is_empty());

    let missing = dir.path().join("missing.retro");
    assert!(h.shell.include(&missing, false).is_err());
}

#[test]
fn nested_include() {
    let dir = tempfile::tempdir().unwrap();
    let inner = write(dir.path(), "inner.retro", "~~~\nb\n~~~\n");
    let missing = dir.path().join("missing.retro").display().to_string();
    let outer = write(
        dir.path(),
        "outer.retro",
        &format!("~~~\na >{inner} >{missing} z\n~~~\n"),
    );

    let mut h = Harness::new(&assemble(true));
    h.shell.include(Path::new(&outer), false).unwrap();
    assert_eq!(h.stack(), chars("abz"));
    let s = h.script.borrow();
    assert!(s.sources.is_empty());
    assert!(s.includes.is_empty());
}

#[test]
fn abort() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "abort.retro", "~~~\na ^ b\nc\n~~~\n");
    let mut h = Harness::new(&assemble(true));
    h.shell.include(Path::new(&path), false).unwrap();
    assert!(h.stack().is_empty());
    assert!(!h.script.borrow().abort);

    h.shell.evaluate("x").unwrap();
    assert_eq!(h.stack(), chars("x"));
}

#[test]
fn nested_abort() {
    let dir = tempfile::tempdir().unwrap();
    let inner = write(dir.path(), "inner.retro", "~~~\nb ^ c\n~~~\n");
    let outer = write(
        dir.path(),
        "outer.retro",
        &format!("~~~\na >{inner} z\n~~~\n"),
    );
    let mut h = Harness::new(&assemble(true));
    h.shell.include(Path::new(&outer), false).unwrap();
    assert!(h.stack().is_empty());

    let s = h.script.borrow();
    assert!(!s.abort && !s.ignore_to_eof && !s.ignore_to_eol);
}

#[test]
fn include_from_running_code() {
    let dir = tempfile::tempdir().unwrap();
    let path = write(dir.path(), "boot.retro", "~~~\nab cd\n~~~\n");
    let mut h = Harness::new(&assemble(true));
    h.shell.vm_mut().inject_string(&path, NAME).unwrap();
    h.shell.run(0).unwrap();

    let mut expected = chars("ac");
    expected.push(42);
    assert_eq!(h.stack(), expected);
}

#[test]
fn startup_word() {
    let mut a = assemble(true);
    let entry = a.address_of("startup").unwrap();
    a.set(dict::STARTUP, entry).unwrap();
    let mut h = Harness::new(&a);
    h.shell.startup().unwrap();
    assert_eq!(h.stack(), [99]);

    let mut h = Harness::new(&assemble(true));
    h.shell.startup().unwrap();
    assert!(h.stack().is_empty());
}

#[test]
fn dump_stack() {
    let mut h = Harness::new(&assemble(true));
    h.shell.dump_stack().unwrap();
    assert_eq!(h.out.take_string(), "");

    for t in ["a", "b", "c"] {
        h.shell.evaluate(t).unwrap();
    }
    h.shell.dump_stack().unwrap();
    assert_eq!(h.out.take_string(), "\nStack: 97 98 [ TOS: 99 ]\n");
}

#[test]
fn faults() {
    let mut h = Harness::new(&assemble(true));
    h.shell.vm_mut().store(5000, 99).unwrap();
    let e = h.shell.run(5000).unwrap_err();
    let f = e.downcast_ref::<Fault>().unwrap();
    assert_eq!(f.kind, FaultKind::InvalidBundle);
    assert_eq!(f.ip, 5000);
    assert_eq!(f.bundle, 99);
}
