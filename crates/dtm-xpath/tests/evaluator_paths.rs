use dtm_xpath::model::builder::{NodeBuilder, attr, doc, elem, text};
use dtm_xpath::{
    CompileMode, CompiledPath, DefaultErrorListener, NodeHandle, StaticContext, Value, XPathContext,
};
use rstest::{fixture, rstest};

struct Env {
    ctx: XPathContext,
    root: NodeHandle,
}

fn item(id: &str, ty: &str, label: &str) -> NodeBuilder {
    elem("item")
        .attr(attr("id", id))
        .attr(attr("type", ty))
        .child(text(label))
}

#[fixture]
fn env() -> Env {
    let tree = doc()
        .child(
            elem("root")
                .child(
                    elem("section")
                        .attr(attr("name", "alpha"))
                        .child(item("item-1", "a", "Alpha One"))
                        .child(item("item-2", "b", "Alpha Two"))
                        .child(item("item-3", "a", "Alpha Three")),
                )
                .child(
                    elem("section")
                        .attr(attr("name", "beta"))
                        .child(item("item-4", "b", "Beta One"))
                        .child(item("item-5", "a", "Beta Two")),
                ),
        )
        .build();
    let mut ctx = XPathContext::default();
    let store = ctx.stores_mut().register_tree(tree);
    let root = ctx.stores().fragment_root(store, 0).unwrap();
    Env { ctx, root }
}

fn eval(env: &mut Env, expr: &str) -> Value {
    let root = env.root;
    eval_at(env, root, expr)
}

fn eval_at(env: &mut Env, node: NodeHandle, expr: &str) -> Value {
    let path = CompiledPath::compile(
        expr,
        None,
        &StaticContext::default(),
        CompileMode::Select,
        &DefaultErrorListener,
    )
    .unwrap();
    path.execute(&mut env.ctx, node, None).unwrap().unwrap()
}

fn strings(env: &mut Env, expr: &str) -> Vec<String> {
    let mut set = eval(env, expr).to_node_set().unwrap();
    set.to_vec()
        .unwrap()
        .into_iter()
        .map(|n| env.ctx.stores().string_value(n))
        .collect()
}

fn string(env: &mut Env, expr: &str) -> String {
    eval(env, expr).to_string_value(env.ctx.stores()).unwrap()
}

fn number(env: &mut Env, expr: &str) -> f64 {
    eval(env, expr).to_number(env.ctx.stores()).unwrap()
}

#[rstest]
#[case("/root/section/item/@id", &["item-1", "item-2", "item-3", "item-4", "item-5"])]
#[case("//item[@type='a']/@id", &["item-1", "item-3", "item-5"])]
#[case("//item[2]/@id", &["item-2", "item-5"])]
#[case("(//item)[2]/@id", &["item-2"])]
#[case("//item[last()]/@id", &["item-3", "item-5"])]
#[case("//item[@id='item-2']/following-sibling::item/@id", &["item-3"])]
#[case("//item[@id='item-3']/preceding-sibling::item[1]/@id", &["item-2"])]
#[case("//section[@name='beta']/item[1]/preceding::item/@id", &["item-1", "item-2", "item-3"])]
#[case("//item[. = 'Alpha Two']/@type", &["b"])]
#[case("//section[item/@id = 'item-4']/@name", &["beta"])]
#[case("//item[@id='item-5']/../@name", &["beta"])]
#[case("//section/item[@type='b'] | //item[@id='item-1']", &["Alpha One", "Alpha Two", "Beta One"])]
fn selects_in_document_order(mut env: Env, #[case] expr: &str, #[case] expected: &[&str]) {
    assert_eq!(strings(&mut env, expr), expected);
}

#[rstest]
#[case("count(/root/section/item)", 5.0)]
#[case("count(//item | //section/item)", 5.0)]
#[case("count(//item[position() mod 2 = 1])", 3.0)]
#[case("count(descendant-or-self::node())", 14.0)]
#[case("count(//@*)", 12.0)]
#[case("count(/root/section[1]/item/following::*)", 5.0)]
#[case("count(//item[@id='item-1']/preceding::*)", 0.0)]
#[case("count(//item[@id='item-4']/ancestor::*)", 2.0)]
#[case("count(//item[@id='item-4']/ancestor-or-self::node())", 4.0)]
#[case("count(/root/self::root)", 1.0)]
#[case("count(/root/self::section)", 0.0)]
#[case("count(//text())", 5.0)]
#[case("round(2.5) + floor(-1.5) + ceiling(1.2)", 3.0)]
#[case("7 mod 3 * 2 - -1", 3.0)]
#[case("string-length('héllo')", 5.0)]
#[case("number('  42 ')", 42.0)]
fn numeric_results(mut env: Env, #[case] expr: &str, #[case] expected: f64) {
    assert_eq!(number(&mut env, expr), expected);
}

#[rstest]
#[case("concat(name(/root/*[1]), '-', local-name(//item[1]/@id))", "section-id")]
#[case("normalize-space('  a \n b  ')", "a b")]
#[case("string(//item[@id='item-4'])", "Beta One")]
#[case("1 div 0", "Infinity")]
#[case("0 div 0", "NaN")]
#[case("10 div 4", "2.5")]
#[case("string(//item/@id = 'item-5')", "true")]
#[case("string(boolean(//nothing))", "false")]
#[case("string(starts-with('Alpha', 'Al') and contains('Alpha', 'ph'))", "true")]
#[case("string(not(1 = 2) or false())", "true")]
#[case("string(function-available('count'))", "true")]
#[case("string(function-available('document'))", "false")]
#[case("namespace-uri(/root)", "")]
fn string_results(mut env: Env, #[case] expr: &str, #[case] expected: &str) {
    assert_eq!(string(&mut env, expr), expected);
}

#[rstest]
fn current_refers_to_the_evaluation_node(mut env: Env) {
    let alpha = eval(&mut env, "/root/section[1]")
        .to_node_set()
        .unwrap()
        .item(0)
        .unwrap()
        .unwrap();
    let v = eval_at(&mut env, alpha, "count(item[current()/@name = 'alpha'])");
    assert_eq!(v.to_number(env.ctx.stores()).unwrap(), 3.0);
    let v = eval_at(&mut env, alpha, "string(item[2]/@id)");
    assert_eq!(v.to_string_value(env.ctx.stores()).unwrap(), "item-2");
}

#[rstest]
fn relative_path_without_context_node_is_an_error(mut env: Env) {
    let path = CompiledPath::compile(
        "item",
        None,
        &StaticContext::default(),
        CompileMode::Select,
        &DefaultErrorListener,
    )
    .unwrap();
    let err = path
        .execute(&mut env.ctx, NodeHandle::NULL, None)
        .unwrap_err();
    assert_eq!(err.code, dtm_xpath::ErrorCode::XPDY0002);
}

#[rstest]
fn path_step_on_a_string_is_a_type_error(mut env: Env) {
    let path = CompiledPath::compile(
        "'abc'/item",
        None,
        &StaticContext::default(),
        CompileMode::Select,
        &DefaultErrorListener,
    )
    .unwrap();
    let root = env.root;
    let err = path.execute(&mut env.ctx, root, None).unwrap_err();
    assert_eq!(err.code, dtm_xpath::ErrorCode::XPTY0004);
}

#[rstest]
fn position_outside_predicates_reads_the_context_node_list(mut env: Env) {
    let items = eval(&mut env, "//item").to_node_set().unwrap();
    let mut list = items.clone_with_reset();
    list.next_node();
    list.next_node();
    let root = env.root;
    let mut scope = env.ctx.context_list_scope(Some(list));
    let path = CompiledPath::compile(
        "position() * 10 + last()",
        None,
        &StaticContext::default(),
        CompileMode::Select,
        &DefaultErrorListener,
    )
    .unwrap();
    let v = path.execute(&mut scope, root, None).unwrap().unwrap();
    assert_eq!(v.to_number(scope.stores()).unwrap(), 25.0);
}

#[rstest]
fn evaluation_leaves_stacks_balanced(mut env: Env) {
    let before = env.ctx.stack_depths();
    for expr in ["//item[@type='a'][last()]", "count(//section[item[2]])", "/"] {
        eval(&mut env, expr);
    }
    assert_eq!(env.ctx.stack_depths(), before);
}
