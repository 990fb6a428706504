use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use dtm_xpath::compiler::FragmentNode;
use dtm_xpath::runtime::SourceLocator;
use dtm_xpath::{
    CompileMode, CompiledPath, DefaultErrorListener, Error, ErrorCode, ExpandedName, Expr,
    ExtensionExpr, NodeHandle, NodeSequence, StaticContext, StaticContextBuilder, Value, XPathContext,
    XPathContextBuilder,
};
use rstest::rstest;

#[derive(Debug)]
struct Counter(Arc<AtomicUsize>);

impl ExtensionExpr for Counter {
    fn execute(&self, _ctx: &mut XPathContext) -> Result<Value, Error> {
        let n = self.0.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(Value::Number(n as f64))
    }
}

fn hand_built(expr: Expr, label: &str) -> CompiledPath {
    CompiledPath::from_expr(
        expr,
        label,
        SourceLocator::default(),
        CompileMode::Select,
        &StaticContext::default(),
    )
}

fn compile(text: &str, sc: &StaticContext) -> CompiledPath {
    CompiledPath::compile(text, None, sc, CompileMode::Select, &DefaultErrorListener).unwrap()
}

fn number(ctx: &mut XPathContext, path: &CompiledPath) -> f64 {
    let v = path.execute(ctx, NodeHandle::NULL, None).unwrap().unwrap();
    v.to_number(ctx.stores()).unwrap()
}

#[rstest]
fn thunk_is_forced_once_across_reads() {
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hand_built(Expr::Extension(Arc::new(Counter(hits.clone()))), "counter()");
    let mut ctx = XPathContext::default();
    let mut frame = ctx.frame_scope(1).unwrap();
    let thunk = counter.thunk(&frame, NodeHandle::NULL, false);
    frame.vars_mut().set_local_variable(0, thunk);
    for _ in 0..10 {
        let v = frame.get_local_variable(0, false).unwrap();
        assert_eq!(v.to_number(frame.stores()).unwrap(), 1.0);
    }
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[rstest]
fn compiled_references_read_locals_and_globals() {
    let sc = StaticContextBuilder::new()
        .with_global_variable(ExpandedName::local("g"))
        .with_local_variable(ExpandedName::local("x"))
        .with_local_variable(ExpandedName::local("y"))
        .build();
    let path = compile("$x * $y + $g", &sc);
    let mut ctx = XPathContextBuilder::new().with_global_slots(1).build();
    ctx.vars_mut().set_global_variable(0, Value::Number(100.0));
    let mut frame = ctx.frame_scope(2).unwrap();
    frame.vars_mut().set_local_variable(0, Value::Number(3.0));
    frame.vars_mut().set_local_variable(1, Value::Number(4.0));
    assert_eq!(number(&mut frame, &path), 112.0);
}

#[rstest]
fn thunk_sees_the_frame_it_was_bound_in() {
    let sc = StaticContextBuilder::new()
        .with_local_variable(ExpandedName::local("a"))
        .with_local_variable(ExpandedName::local("b"))
        .build();
    let deferred = compile("$a + 1", &sc);
    let read_b = compile("$b", &sc);
    let mut ctx = XPathContext::default();
    let mut outer = ctx.frame_scope(2).unwrap();
    outer.vars_mut().set_local_variable(0, Value::Number(41.0));
    let thunk = deferred.thunk(&outer, NodeHandle::NULL, false);
    outer.vars_mut().set_local_variable(1, thunk);
    {
        // a deeper frame with different values must not leak into the thunk
        let mut inner = outer.frame_scope(2).unwrap();
        inner.vars_mut().set_local_variable(0, Value::Number(-1.0));
        assert!(!inner.vars().is_local_set(1));
    }
    assert_eq!(number(&mut outer, &read_b), 42.0);
}

#[rstest]
fn self_referencing_thunk_is_circular() {
    let sc = StaticContextBuilder::new()
        .with_local_variable(ExpandedName::local("x"))
        .build();
    let loops = compile("$x + 1", &sc);
    let read_x = compile("$x", &sc);
    let mut ctx = XPathContext::default();
    let mut frame = ctx.frame_scope(1).unwrap();
    let thunk = loops.thunk(&frame, NodeHandle::NULL, false);
    frame.vars_mut().set_local_variable(0, thunk);
    let err = read_x
        .execute(&mut frame, NodeHandle::NULL, None)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DTMX0002);
    assert!(err.is_fatal());
    // the binding is restored, so a second read fails the same way
    let again = frame.get_local_variable(0, false).unwrap_err();
    assert_eq!(again.code, ErrorCode::DTMX0002);
}

#[rstest]
fn reading_an_unset_slot_is_unbound() {
    let sc = StaticContextBuilder::new()
        .with_local_variable(ExpandedName::local("late"))
        .build();
    let path = compile("$late", &sc);
    let mut ctx = XPathContext::default();
    let mut frame = ctx.frame_scope(1).unwrap();
    let err = path
        .execute(&mut frame, NodeHandle::NULL, None)
        .unwrap_err();
    assert_eq!(err.code, ErrorCode::DTMX0001);
    assert!(err.message.contains("$late"));
    assert_eq!(err.locator.unwrap().expression.as_deref(), Some("$late"));
}

#[rstest]
fn node_set_variables_hand_out_fresh_cursors() {
    let mut ctx = XPathContext::default();
    let store = ctx.stores_mut().register_tree(
        dtm_xpath::model::builder::doc()
            .child(
                dtm_xpath::model::builder::elem("r")
                    .child(dtm_xpath::model::builder::elem("a"))
                    .child(dtm_xpath::model::builder::elem("a")),
            )
            .build(),
    );
    let root = ctx.stores().fragment_root(store, 0).unwrap();
    let all_a = compile("/r/a", &StaticContext::default());
    let set = all_a.execute(&mut ctx, root, None).unwrap().unwrap();
    let mut frame = ctx.frame_scope(1).unwrap();
    frame.vars_mut().set_local_variable(0, set);
    let mut first = frame.get_local_variable(0, false).unwrap().to_node_set().unwrap();
    assert!(first.next_node().is_some());
    assert!(first.next_node().is_some());
    let mut second = frame.get_local_variable(0, false).unwrap().to_node_set().unwrap();
    assert!(second.is_fresh());
    assert_eq!(second.get_length().unwrap(), 2);
}

#[rstest]
fn global_thunk_fragment_outlives_rtf_scopes() {
    let build = hand_built(
        Expr::Construct(vec![FragmentNode::Text("global text".to_string())]),
        "<global/>",
    );
    let mut ctx = XPathContextBuilder::new().with_global_slots(1).build();
    let thunk = build.thunk(&ctx, NodeHandle::NULL, true);
    ctx.vars_mut().set_global_variable(0, thunk);
    let fragment = {
        let mut scope = ctx.rtf_scope();
        match scope.get_global_variable(0, false).unwrap() {
            Value::Fragment(h) => h,
            other => panic!("expected a fragment, got {other:?}"),
        }
    };
    assert_eq!(ctx.stores().string_value(fragment), "global text");
    assert_ne!(fragment.store(), ctx.get_rtf_dtm());
    let again = ctx.get_global_variable(0, false).unwrap();
    assert_eq!(again.to_string_value(ctx.stores()).unwrap(), "global text");
}

#[rstest]
fn local_thunk_fragment_is_discarded_with_its_scope() {
    let build = hand_built(
        Expr::Construct(vec![FragmentNode::Text("scratch".to_string())]),
        "<local/>",
    );
    let mut ctx = XPathContext::default();
    let store = {
        let mut rtf = ctx.rtf_scope();
        let mut frame = rtf.frame_scope(1).unwrap();
        let thunk = build.thunk(&frame, NodeHandle::NULL, false);
        frame.vars_mut().set_local_variable(0, thunk);
        match frame.get_local_variable(0, false).unwrap() {
            Value::Fragment(h) => h.store(),
            other => panic!("expected a fragment, got {other:?}"),
        }
    };
    let arena = ctx.stores().arena(store).unwrap();
    assert_eq!(arena.fragment_count(), 0);
}

#[rstest]
#[case(1)]
#[case(5)]
#[case(50)]
fn frames_balance_after_nested_evaluation(#[case] depth: usize) {
    let sc = StaticContextBuilder::new()
        .with_local_variable(ExpandedName::local("v"))
        .build();
    let path = compile("$v * 2", &sc);
    let mut ctx = XPathContext::default();
    let before = ctx.stack_depths();
    fn nest(ctx: &mut XPathContext, path: &CompiledPath, left: usize) -> f64 {
        let mut frame = ctx.frame_scope(1).unwrap();
        frame.vars_mut().set_local_variable(0, Value::Number(left as f64));
        let here = number(&mut frame, path);
        if left == 0 {
            here
        } else {
            here + nest(&mut frame, path, left - 1)
        }
    }
    let total = nest(&mut ctx, &path, depth);
    assert_eq!(total, (depth * (depth + 1)) as f64);
    assert_eq!(ctx.stack_depths(), before);
}

#[rstest]
#[case("count($v)", 2.0)]
#[case("count($v[true()])", 2.0)]
#[case("count($v | /nothing)", 2.0)]
#[case("count(/nothing | $v)", 2.0)]
#[case("count($v | /r/a)", 2.0)]
#[case("count(/r/* | $v)", 3.0)]
#[case("sum($v)", 3.0)]
#[case("sum($v | /r/c)", 6.0)]
fn lazy_node_set_variables_are_read_in_full(
    #[case] text: &str,
    #[case] expected: f64,
    #[values(true, false)] cache: bool,
) {
    use dtm_xpath::model::builder::{doc, elem, text as txt};

    let mut ctx = XPathContext::default();
    let store = ctx.stores_mut().register_tree(
        doc()
            .child(
                elem("r")
                    .child(elem("a").child(txt("1")))
                    .child(elem("b").child(txt("2")))
                    .child(elem("c").child(txt("3"))),
            )
            .build(),
    );
    let root = ctx.stores().fragment_root(store, 0).unwrap();
    let first = |ctx: &mut XPathContext, p: &str| {
        let v = compile(p, &StaticContext::default())
            .execute(ctx, root, None)
            .unwrap()
            .unwrap();
        v.to_node_set().unwrap().next_node().unwrap()
    };
    let (a, b) = (first(&mut ctx, "/r/a"), first(&mut ctx, "/r/b"));

    let mut lazy = NodeSequence::lazy(vec![a, b].into_iter());
    lazy.set_should_cache_nodes(cache).unwrap();
    let sc = StaticContextBuilder::new()
        .with_local_variable(ExpandedName::local("v"))
        .build();
    let path = compile(text, &sc);
    let mut frame = ctx.frame_scope(1).unwrap();
    frame.vars_mut().set_local_variable(0, Value::NodeSet(lazy));
    let v = path.execute(&mut frame, root, None).unwrap().unwrap();
    assert_eq!(v.to_number(frame.stores()).unwrap(), expected);
}
