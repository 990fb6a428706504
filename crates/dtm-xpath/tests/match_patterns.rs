use dtm_xpath::model::builder::{attr, comment, doc, elem, elem_ns, text};
use dtm_xpath::{
    CompileMode, CompiledPath, DefaultErrorListener, ErrorCode, MATCH_SCORE_NODETEST,
    MATCH_SCORE_NONE, MATCH_SCORE_NSWILD, MATCH_SCORE_OTHER, MATCH_SCORE_QNAME, NodeHandle,
    StaticContext, StaticContextBuilder, XPathContext,
};
use rstest::{fixture, rstest};

struct Env {
    ctx: XPathContext,
    root: NodeHandle,
    sc: StaticContext,
}

#[fixture]
fn env() -> Env {
    let tree = doc()
        .child(
            elem("root")
                .child(
                    elem("section")
                        .child(elem("item").attr(attr("id", "i1")).attr(attr("type", "a")))
                        .child(elem("item").attr(attr("id", "i2")).attr(attr("type", "b")))
                        .child(comment("note"))
                        .child(elem("item").attr(attr("id", "i3")).attr(attr("type", "a"))),
                )
                .child(elem_ns("urn:p", "p:item").child(text("ns text")))
                .child(elem("item").attr(attr("id", "top"))),
        )
        .build();
    let mut ctx = XPathContext::default();
    let store = ctx.stores_mut().register_tree(tree);
    let root = ctx.stores().fragment_root(store, 0).unwrap();
    let sc = StaticContextBuilder::new().with_namespace("p", "urn:p").build();
    Env { ctx, root, sc }
}

fn select(env: &mut Env, expr: &str) -> NodeHandle {
    let path = CompiledPath::compile(
        expr,
        None,
        &env.sc,
        CompileMode::Select,
        &DefaultErrorListener,
    )
    .unwrap();
    let root = env.root;
    let v = path.execute(&mut env.ctx, root, None).unwrap().unwrap();
    let mut set = v.to_node_set().unwrap();
    set.next_node().unwrap()
}

fn score(env: &mut Env, pattern: &str, node: NodeHandle) -> f64 {
    let path = CompiledPath::compile(
        pattern,
        None,
        &env.sc,
        CompileMode::Match,
        &DefaultErrorListener,
    )
    .unwrap();
    path.get_match_score(&mut env.ctx, node).unwrap()
}

#[rstest]
#[case("item", "//item[@id='i1']", MATCH_SCORE_QNAME)]
#[case("*", "//item[@id='i1']", MATCH_SCORE_NODETEST)]
#[case("node()", "//item[@id='i1']", MATCH_SCORE_NODETEST)]
#[case("p:*", "/root/p:item", MATCH_SCORE_NSWILD)]
#[case("p:item", "/root/p:item", MATCH_SCORE_QNAME)]
#[case("item", "/root/p:item", MATCH_SCORE_NONE)]
#[case("p:*", "//item[@id='i1']", MATCH_SCORE_NONE)]
#[case("section/item", "//item[@id='i2']", MATCH_SCORE_OTHER)]
#[case("root/item", "//item[@id='i2']", MATCH_SCORE_NONE)]
#[case("root//item", "//item[@id='i2']", MATCH_SCORE_OTHER)]
#[case("//item", "//item[@id='top']", MATCH_SCORE_OTHER)]
#[case("/root/item", "//item[@id='top']", MATCH_SCORE_OTHER)]
#[case("/item", "//item[@id='top']", MATCH_SCORE_NONE)]
#[case("/root", "/root", MATCH_SCORE_OTHER)]
#[case("/", "/", MATCH_SCORE_NODETEST)]
#[case("/", "/root", MATCH_SCORE_NONE)]
#[case("root", "/", MATCH_SCORE_NONE)]
#[case("comment()", "//comment()", MATCH_SCORE_NODETEST)]
#[case("text()", "//text()", MATCH_SCORE_NODETEST)]
#[case("p:item/text()", "//text()", MATCH_SCORE_OTHER)]
fn scores_by_specificity(
    mut env: Env,
    #[case] pattern: &str,
    #[case] target: &str,
    #[case] expected: f64,
) {
    let node = select(&mut env, target);
    assert_eq!(score(&mut env, pattern, node), expected);
}

#[rstest]
#[case("@id", "//item[@id='i3']/@id", MATCH_SCORE_QNAME)]
#[case("@*", "//item[@id='i3']/@id", MATCH_SCORE_NODETEST)]
#[case("item/@id", "//item[@id='i3']/@id", MATCH_SCORE_OTHER)]
#[case("@type", "//item[@id='i3']/@id", MATCH_SCORE_NONE)]
#[case("id", "//item[@id='i3']/@id", MATCH_SCORE_NONE)]
#[case("@id", "//item[@id='i3']", MATCH_SCORE_NONE)]
fn attribute_patterns(
    mut env: Env,
    #[case] pattern: &str,
    #[case] target: &str,
    #[case] expected: f64,
) {
    let node = select(&mut env, target);
    assert_eq!(score(&mut env, pattern, node), expected);
}

#[rstest]
#[case("item[@type='a']", "i1", MATCH_SCORE_OTHER)]
#[case("item[@type='a']", "i2", MATCH_SCORE_NONE)]
#[case("item[2]", "i2", MATCH_SCORE_OTHER)]
#[case("item[2]", "i3", MATCH_SCORE_NONE)]
#[case("item[last()]", "i3", MATCH_SCORE_OTHER)]
#[case("item[@type='a'][2]", "i3", MATCH_SCORE_OTHER)]
#[case("item[@type='a'][2]", "i1", MATCH_SCORE_NONE)]
#[case("section[item]/item", "i1", MATCH_SCORE_OTHER)]
fn predicates_use_sibling_positions(
    mut env: Env,
    #[case] pattern: &str,
    #[case] id: &str,
    #[case] expected: f64,
) {
    let node = select(&mut env, &format!("//item[@id='{id}']"));
    assert_eq!(score(&mut env, pattern, node), expected);
}

#[rstest]
fn union_takes_the_best_alternative(mut env: Env) {
    let node = select(&mut env, "//item[@id='i1']");
    assert_eq!(score(&mut env, "* | item", node), MATCH_SCORE_QNAME);
    assert_eq!(score(&mut env, "item | section/item", node), MATCH_SCORE_OTHER);
    assert_eq!(score(&mut env, "comment() | p:*", node), MATCH_SCORE_NONE);
}

#[rstest]
fn more_specific_pattern_wins_rule_selection(mut env: Env) {
    let patterns = ["*", "item", "section/item", "p:*"];
    let node = select(&mut env, "//item[@id='i2']");
    let best = patterns
        .iter()
        .map(|p| (p, score(&mut env, p, node)))
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    assert_eq!(*best.0, "section/item");
    let top = select(&mut env, "//item[@id='top']");
    let best = patterns
        .iter()
        .map(|p| (p, score(&mut env, p, top)))
        .filter(|(_, s)| *s != MATCH_SCORE_NONE)
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .unwrap();
    assert_eq!(*best.0, "item");
}

#[rstest]
fn scoring_only_moves_the_current_node(mut env: Env) {
    let node = select(&mut env, "//item[@id='i1']");
    let before = env.ctx.stack_depths();
    score(&mut env, "section/item[@type='a'][1]", node);
    assert_eq!(env.ctx.stack_depths(), before);
    assert!(env.ctx.current_node().is_null());
}

#[rstest]
#[case("ancestor::item")]
#[case("item/..")]
#[case("string(item)")]
#[case("(item)[1]")]
#[case("root//")]
fn rejects_non_patterns(env: Env, #[case] pattern: &str) {
    let err = CompiledPath::compile(
        pattern,
        None,
        &env.sc,
        CompileMode::Match,
        &DefaultErrorListener,
    )
    .unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0003);
}
