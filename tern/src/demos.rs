//! Bundled programs, assembled with [`BytecodeBuilder`].
use crate::{BytecodeBuilder, FunctionBody, Op};

pub struct Demo {
    pub name: &'static str,
    pub summary: &'static str,
    build: fn() -> FunctionBody,
}

impl Demo {
    pub fn program(&self) -> FunctionBody {
        (self.build)()
    }
}

pub const DEMOS: &[Demo] = &[
    Demo {
        name: "closures",
        summary: "counters sharing captured state, partial application",
        build: closures,
    },
    Demo {
        name: "inheritance",
        summary: "user types, init, overriding and super lookups",
        build: inheritance,
    },
    Demo {
        name: "exceptions",
        summary: "typed catchers, nested handlers, raising plain values",
        build: exceptions,
    },
    Demo {
        name: "iteration",
        summary: "the iterator protocol, map/filter/reduce/each",
        build: iteration,
    },
    Demo {
        name: "gc",
        summary: "unreachable cycles reclaimed by the collector",
        build: gc,
    },
];

pub fn find(name: &str) -> Option<&'static Demo> {
    DEMOS.iter().find(|demo| demo.name == name)
}

fn no_args(_: &mut BytecodeBuilder) {}

/// `print(<label>, <value>)` where `value` is emitted by `emit`.
fn print_labelled(b: &mut BytecodeBuilder, label: &str, emit: impl FnOnce(&mut BytecodeBuilder)) {
    b.read("print").push_string(label);
    emit(b);
    b.call(2).pop();
}

fn closures() -> FunctionBody {
    // fn() { count = count + 1; return count }
    let mut tick = BytecodeBuilder::new();
    tick.read("count")
        .push_int(1)
        .add_fast()
        .dup()
        .write("count")
        .return_();

    // fn() { let count = 0; return tick }
    let mut make_counter = BytecodeBuilder::new();
    make_counter
        .push_int(0)
        .let_("count")
        .push_function(tick.into_function("tick", 0, false))
        .return_();

    let mut add = BytecodeBuilder::new();
    add.read_arg(0).read_arg(1).add_fast().return_();

    let mut b = BytecodeBuilder::new();
    b.push_function(make_counter.into_function("make_counter", 0, false))
        .let_("make_counter");
    b.read("make_counter").call(0).let_("a");
    b.read("make_counter").call(0).let_("b");
    for _ in 0..2 {
        b.read("a").call(0).pop();
    }
    print_labelled(&mut b, "a after three ticks:", |b| {
        b.read("a").call(0);
    });
    print_labelled(&mut b, "b after one tick:", |b| {
        b.read("b").call(0);
    });

    b.push_function(add.into_function("add", 2, false)).let_("add");
    b.read("add").send("bind", 1, |b| {
        b.push_int(5);
    });
    b.let_("add5");
    print_labelled(&mut b, "add5(10) =", |b| {
        b.read("add5").push_int(10).call(1);
    });
    print_labelled(&mut b, "add5 takes", |b| {
        b.read("add5").send("arity", 0, no_args);
    });
    b.push_nil().return_();
    b.into_program()
}

fn inheritance() -> FunctionBody {
    let mut init = BytecodeBuilder::new();
    init.read_self()
        .read_arg(0)
        .write_member("name")
        .push_nil()
        .return_();

    let mut speak = BytecodeBuilder::new();
    speak
        .read_self()
        .read_member("name")
        .push_string(" makes a sound")
        .add_fast()
        .return_();

    let mut describe = BytecodeBuilder::new();
    describe
        .push_string("I am ")
        .read_self()
        .read_member("name")
        .add_fast()
        .push_string(": ")
        .add_fast()
        .read_self()
        .send("speak", 0, no_args)
        .add_fast()
        .return_();

    let mut bark = BytecodeBuilder::new();
    bark.read_self()
        .read_member("name")
        .push_string(" barks")
        .add_fast()
        .return_();

    let mut b = BytecodeBuilder::new();
    b.push_type(
        "Animal",
        None,
        vec![
            init.into_function("init", 1, false),
            speak.into_function("speak", 0, false),
            describe.into_function("describe", 0, false),
        ],
    )
    .let_("Animal");
    b.push_type("Dog", Some("Animal"), vec![bark.into_function("speak", 0, false)])
        .let_("Dog");

    b.read("Animal").push_string("generic").construct(1).let_("animal");
    // calling a type constructs it too
    b.read("Dog").push_string("Rex").call(1).let_("dog");

    b.read("print");
    b.read("animal").send("describe", 0, no_args);
    b.call(1).pop();
    b.read("print");
    b.read("dog").send("describe", 0, no_args);
    b.call(1).pop();

    print_labelled(&mut b, "Rex is an Animal:", |b| {
        b.read("dog").send("is_a", 1, |b| {
            b.read("Animal");
        });
    });
    print_labelled(&mut b, "Dog's parent:", |b| {
        b.read("Dog").send("parent", 0, no_args);
    });
    print_labelled(&mut b, "Dog defines:", |b| {
        b.read("Dog").send("methods", 0, no_args);
    });
    b.push_nil().return_();
    b.into_program()
}

fn exceptions() -> FunctionBody {
    // fn(n) { if n < 0 { raise ValidationError("negative: " + str(n)) } return n }
    let mut check = BytecodeBuilder::new();
    check.read_arg(0).send("lt", 1, |b| {
        b.push_int(0);
    });
    let valid = check.jump_if_false();
    check
        .pop()
        .read("ValidationError")
        .push_string("negative: ")
        .read("str")
        .read_arg(0)
        .call(1)
        .add_fast()
        .call(1)
        .raise();
    check.bind(valid);
    check.pop().read_arg(0).return_();

    // fn(e) { return "handled " + str(e) }
    let handled = || {
        let mut h = BytecodeBuilder::new();
        h.push_string("handled ")
            .read("str")
            .read_arg(0)
            .call(1)
            .add_fast()
            .return_();
        h.into_function("handler", 1, false)
    };

    let mut b = BytecodeBuilder::new();
    b.push_type("ValidationError", Some("Exception"), Vec::new())
        .let_("ValidationError");
    b.push_function(check.into_function("check", 1, false))
        .let_("check");

    // no exception: the body's value reaches the resume point
    b.read("ValidationError").push_function(handled());
    let resume = b.push_catcher();
    b.read("check").push_int(7).call(1).pop_catcher();
    b.bind(resume);
    b.let_("result");
    print_labelled(&mut b, "check(7) ->", |b| {
        b.read("result");
    });

    // caught by type
    b.read("ValidationError").push_function(handled());
    let resume = b.push_catcher();
    b.read("check").push_int(-5).call(1).pop_catcher();
    b.bind(resume);
    b.let_("result");
    print_labelled(&mut b, "check(-5) ->", |b| {
        b.read("result");
    });

    // a builtin error skips the unrelated inner catcher
    b.read("Exception").push_function(handled());
    let outer = b.push_catcher();
    b.read("TypeError").push_function(handled());
    let inner = b.push_catcher();
    b.push_int(1).push_int(0).div_fast().pop_catcher();
    b.bind(inner);
    b.pop_catcher();
    b.bind(outer);
    b.let_("result");
    print_labelled(&mut b, "1 / 0 ->", |b| {
        b.read("result");
    });

    // any value can be raised; a nil filter catches everything
    b.push_nil().push_function(handled());
    let resume = b.push_catcher();
    b.push_symbol("oops").raise().pop_catcher();
    b.bind(resume);
    b.let_("result");
    print_labelled(&mut b, "raise :oops ->", |b| {
        b.read("result");
    });

    b.push_nil().return_();
    b.into_program()
}

fn iteration() -> FunctionBody {
    let mut square = BytecodeBuilder::new();
    square.read_arg(0).read_arg(0).mul_fast().return_();

    let mut is_even = BytecodeBuilder::new();
    is_even
        .read_arg(0)
        .send("mod", 1, |b| {
            b.push_int(2);
        })
        .send("eq", 1, |b| {
            b.push_int(0);
        })
        .return_();

    let mut sum = BytecodeBuilder::new();
    sum.read_arg(0).read_arg(1).add_fast().return_();

    let mut show_pair = BytecodeBuilder::new();
    show_pair.read("print");
    show_pair.read_arg(0).send("at", 1, |b| {
        b.push_int(0);
    });
    show_pair.push_string("=>");
    show_pair.read_arg(0).send("at", 1, |b| {
        b.push_int(1);
    });
    show_pair.call(3).return_();

    let mut b = BytecodeBuilder::new();
    for word in ["tern", "is", "a", "small", "language"] {
        b.push_string(word);
    }
    b.make_array(5).let_("words");

    // it = words.start(); while !it.at_end() { print(it.position(), it.get()); it.increment() }
    b.read("words").send("start", 0, no_args).let_("it");
    let head = b.loop_target();
    b.read("it").send("at_end", 0, no_args);
    let done = b.jump_if_true();
    b.pop();
    b.read("print");
    b.read("it").send("position", 0, no_args);
    b.read("it").send("get", 0, no_args);
    b.call(2).pop();
    b.read("it").send("increment", 0, no_args).pop();
    b.jump_back(Op::Jump, head);
    b.bind(done);
    b.pop();

    print_labelled(&mut b, "squares:", |b| {
        b.read("map").read("range").push_int(1).push_int(6).call(2);
        b.push_function(square.into_function("square", 1, false)).call(2);
    });
    print_labelled(&mut b, "evens:", |b| {
        b.read("filter").read("range").push_int(0).push_int(10).call(2);
        b.push_function(is_even.into_function("is_even", 1, false)).call(2);
    });
    print_labelled(&mut b, "sum of 1..11:", |b| {
        b.read("reduce").read("range").push_int(1).push_int(11).call(2);
        b.push_int(0)
            .push_function(sum.into_function("sum", 2, false))
            .call(3);
    });

    b.push_string("one").push_int(1).push_string("two").push_int(2);
    b.make_dict(2).let_("numbers");
    b.read("each");
    b.read("numbers").send("items", 0, no_args);
    b.push_function(show_pair.into_function("show_pair", 1, false))
        .call(2)
        .pop();

    b.read("words").send("sort", 0, no_args).pop();
    print_labelled(&mut b, "sorted:", |b| {
        b.read("words").send("join", 1, |b| {
            b.push_string(" ");
        });
    });
    b.push_nil().return_();
    b.into_program()
}

fn gc() -> FunctionBody {
    // fn(i) { let a = Node(); let b = Node(); a.next = b; b.next = a; return nil }
    let mut churn = BytecodeBuilder::new();
    churn.read("Node").construct(0).let_("a");
    churn.read("Node").construct(0).let_("b");
    churn.read("a").read("b").write_member("next");
    churn.read("b").read("a").write_member("next");
    churn.push_nil().return_();

    let mut b = BytecodeBuilder::new();
    b.push_type("Node", None, Vec::new()).let_("Node");
    b.push_string("kept").push_int(2).make_array(2).let_("survivor");

    b.read("each").read("range").push_int(0).push_int(100).call(2);
    b.push_function(churn.into_function("churn", 1, false))
        .call(2)
        .pop();

    b.read("gc").call(0).let_("freed");
    print_labelled(&mut b, "freed at least 200 cells:", |b| {
        b.read("freed").send("ge", 1, |b| {
            b.push_int(200);
        });
    });
    print_labelled(&mut b, "survivor:", |b| {
        b.read("survivor");
    });
    print_labelled(&mut b, "second collection frees", |b| {
        b.read("gc").call(0);
    });
    b.push_nil().return_();
    b.into_program()
}

#[cfg(test)]
mod tests {
    use std::{cell::RefCell, io::Write, rc::Rc};

    use super::*;
    use crate::VM;

    #[derive(Clone, Default)]
    struct Capture(Rc<RefCell<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn run(name: &str) -> String {
        let mut vm = VM::default();
        let capture = Capture::default();
        vm.set_output(Box::new(capture.clone()));
        let demo = find(name).expect("demo exists");
        let outcome = vm.execute(demo.program());
        assert!(outcome.is_returned(), "{name} raised: {:?}", vm.repr(outcome.value()));
        String::from_utf8_lossy(&capture.0.borrow()).into_owned()
    }

    #[test]
    fn closures_keep_separate_counts() {
        let out = run("closures");
        assert!(out.contains("a after three ticks: 3\n"), "{out}");
        assert!(out.contains("b after one tick: 1\n"), "{out}");
        assert!(out.contains("add5(10) = 15\n"), "{out}");
        assert!(out.contains("add5 takes 1\n"), "{out}");
    }

    #[test]
    fn overrides_are_found_through_self() {
        let out = run("inheritance");
        assert!(out.contains("I am generic: generic makes a sound\n"), "{out}");
        assert!(out.contains("I am Rex: Rex barks\n"), "{out}");
        assert!(out.contains("Rex is an Animal: true\n"), "{out}");
        assert!(out.contains("Dog's parent: <type Animal>\n"), "{out}");
    }

    #[test]
    fn handlers_produce_the_resumed_value() {
        let out = run("exceptions");
        assert!(out.contains("check(7) -> 7\n"), "{out}");
        assert!(
            out.contains("check(-5) -> handled ValidationError: negative: -5\n"),
            "{out}"
        );
        assert!(out.contains("1 / 0 -> handled DivideByZero"), "{out}");
        assert!(out.contains("raise :oops -> handled :oops\n"), "{out}");
    }

    #[test]
    fn iteration_walks_every_element() {
        let out = run("iteration");
        assert!(out.starts_with("0 tern\n1 is\n"), "{out}");
        assert!(out.contains("squares: [1, 4, 9, 16, 25]\n"), "{out}");
        assert!(out.contains("evens: [0, 2, 4, 6, 8]\n"), "{out}");
        assert!(out.contains("sum of 1..11: 55\n"), "{out}");
        assert!(out.contains("one => 1\ntwo => 2\n"), "{out}");
        assert!(out.contains("sorted: a is language small tern\n"), "{out}");
    }

    #[test]
    fn gc_demo_reclaims_cycles() {
        let out = run("gc");
        assert!(out.contains("freed at least 200 cells: true\n"), "{out}");
        assert!(out.contains(r#"survivor: ["kept", 2]"#), "{out}");
    }

    #[test]
    fn every_demo_has_a_unique_name() {
        for (i, demo) in DEMOS.iter().enumerate() {
            assert!(DEMOS[i + 1..].iter().all(|other| other.name != demo.name));
        }
    }
}
