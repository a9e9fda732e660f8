use criterion::{Criterion, black_box, criterion_group, criterion_main};
use yar::{Value, Vm, VmCreateInfo};

const FIB: &str =
    "fib: fn [n] [either lt n 2 [n] [add fib sub n 1 fib sub n 2]]";

fn boot(source: &str) -> Vm {
    let mut vm = Vm::new(&VmCreateInfo::default()).unwrap();
    vm.execute(source).unwrap();
    vm
}

fn bench_fib(c: &mut Criterion) {
    let mut vm = boot(FIB);
    let block = vm.parse("fib 20").unwrap();
    vm.bind(block).unwrap();
    c.bench_function("fib 20", |b| {
        b.iter(|| {
            let result = vm.run_block(black_box(block)).unwrap();
            assert_eq!(result, Value::Integer(6765));
        })
    });
}

fn bench_loop(c: &mut Criterion) {
    let mut vm = boot("total: 0");
    let block = vm
        .parse("total: 0 repeat i 10000 [total: add total i]")
        .unwrap();
    vm.bind(block).unwrap();
    c.bench_function("repeat 10000", |b| {
        b.iter(|| vm.run_block(black_box(block)).unwrap())
    });
}

fn bench_forks(c: &mut Criterion) {
    let mut vm = boot(FIB);
    let fib = vm.lookup("fib").unwrap().unwrap().as_proc().unwrap();
    vm.freeze();
    c.bench_function("fork fib 15", |b| {
        b.iter(|| {
            let mut fork = vm.fork(&[Value::Integer(15)]).unwrap();
            fork.run_proc(black_box(fib)).unwrap()
        })
    });
}

criterion_group!(benches, bench_fib, bench_loop, bench_forks);
criterion_main!(benches);
