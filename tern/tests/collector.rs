use tern::{BytecodeBuilder, HeapSettings, NativeApi, NativeHandle, Outcome, VM, VMCreateInfo, Value};

fn small_vm() -> VM {
    VM::new(VMCreateInfo {
        heap: HeapSettings {
            chunk_size: 64,
            initial_chunks: 2,
            max_chunks: 64,
        },
    })
}

#[test]
fn cached_integers_are_identical_and_others_are_not() {
    let mut vm = VM::default();
    assert_eq!(vm.alloc_integer(1023), vm.alloc_integer(1023));
    let a = vm.alloc_integer(1024);
    let b = vm.alloc_integer(1024);
    assert_ne!(a, b);
    assert_eq!(vm.int_value(a), vm.int_value(b));
    assert_eq!(Value::from_bool(true), Value::TRUE);
}

#[test]
fn a_self_containing_array_lives_while_bound_and_dies_after() {
    let mut vm = VM::default();
    let mut b = BytecodeBuilder::new();
    b.make_array(0).let_("a");
    b.read("a").send("append", 1, |b| {
        b.read("a");
    });
    b.pop();
    b.read("a").let_("keep");
    b.push_nil().return_copy_locals();
    assert!(vm.execute_repl_line(b.into_program()).is_returned());

    let a = vm.global("a").expect("a is bound");
    vm.collect_garbage();
    assert!(vm.heap.is_live(a));
    assert_eq!(vm.array_elements(a).expect("array")[0], a);

    let mut b = BytecodeBuilder::new();
    b.push_nil().write("a").push_nil().write("keep");
    b.push_nil().return_();
    assert!(vm.execute(b.into_program()).is_returned());

    let stats = vm.collect_garbage();
    assert!(stats.freed >= 1);
    assert!(!vm.heap.is_live(a));
}

#[test]
fn programs_run_in_a_heap_that_must_collect_to_keep_going() {
    let mut vm = small_vm();
    // sum = 0; for i in 0..2000 { sum = sum + [i].at(0) }
    let mut b = BytecodeBuilder::new();
    b.push_int(0).let_("sum").push_int(0).let_("i");
    let head = b.loop_target();
    b.read("i").send("lt", 1, |b| {
        b.push_int(2000);
    });
    let done = b.jump_if_false();
    b.pop();
    b.read("sum");
    b.read("i").make_array(1).send("at", 1, |b| {
        b.push_int(0);
    });
    b.add_fast().write("sum");
    b.read("i").push_int(1).add_fast().write("i");
    b.jump_back(tern::Op::Jump, head);
    b.bind(done);
    b.pop().read("sum").return_();

    let outcome = vm.execute(b.into_program());
    let Outcome::Returned(sum) = outcome else {
        panic!("loop raised");
    };
    assert_eq!(vm.int_value(sum), Some(1999 * 2000 / 2));
    assert!(vm.heap.collections() > 0);
    assert!(vm.heap.chunk_count() <= 64);
}

fn make_point(api: &mut NativeApi<'_>, _receiver: NativeHandle, args: &[NativeHandle]) -> NativeHandle {
    let [x, y] = args else {
        return NativeHandle::NULL;
    };
    let point = api.dictionary();
    let (kx, ky) = (api.symbol("x"), api.symbol("y"));
    if api.dict_set(point, kx, *x) && api.dict_set(point, ky, *y) {
        point
    } else {
        NativeHandle::NULL
    }
}

#[test]
fn native_results_survive_collections_in_the_caller() {
    let mut vm = small_vm();
    NativeApi::new(&mut vm).register_function("point", make_point);

    let mut b = BytecodeBuilder::new();
    b.read("point").push_int(3).push_int(4).call(2).let_("p");
    b.read("gc").call(0).pop();
    b.read("p").send("at", 1, |b| {
        b.push_symbol("y");
    });
    b.return_();
    let outcome = vm.execute(b.into_program());
    assert_eq!(vm.int_value(outcome.value()), Some(4));
}
