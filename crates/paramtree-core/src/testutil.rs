//! Shared template fixture for the unit tests of this crate.

use crate::{ParameterTree, TreeOptions};

pub(crate) const TEMPLATE: &str = r#"
    <Template Id="solver" Name="Solver settings">
        <Branch Name="SolverParams">
            <Leaf Name="Iterations" Type="xs:positiveInteger" Unit="true"
                  Restrictions='{"xs:maxInclusive": 10}' Default="5"/>
            <Branch Name="Output" Optional="true" MinOccurs="0" MaxOccurs="unbounded">
                <Leaf Name="Path" Type="xs:file" Input="file"
                      Restrictions='{"xs:filetype": ["xml"]}'/>
            </Branch>
            <Branch Name="Method" Choice="true">
                <Branch Name="Direct"><Leaf Name="Marker" Input="none"/></Branch>
                <Branch Name="Iterative"><Leaf Name="Tolerance" Type="xs:double"/></Branch>
            </Branch>
            <Leaf Name="Precond" Input="select">
                <Option>NONE</Option>
                <Option>JACOBI</Option>
            </Leaf>
            <Branch Name="Limits" MaxOccurs="2">
                <Branch Name="Kind" Choice="true">
                    <Branch Name="Hard"><Leaf Name="Max" Type="xs:double" Default="1.0"/></Branch>
                    <Branch Name="Soft"><Leaf Name="Weight" Type="xs:double" Default="0.5"/></Branch>
                </Branch>
            </Branch>
        </Branch>
    </Template>
"#;

pub(crate) fn build_tree() -> ParameterTree {
    build_tree_with(&TreeOptions::default())
}

pub(crate) fn build_tree_with(options: &TreeOptions) -> ParameterTree {
    let model = paramtree_xml::parse(TEMPLATE).expect("parse fixture template");
    ParameterTree::from_template(&model, options)
}

/// Fill the fixture in until the root becomes valid.
pub(crate) fn complete(tree: &mut ParameterTree) {
    let method = tree.find("Method").expect("method");
    let direct = tree.find("Method/Direct").expect("direct");
    tree.select_choice(method, direct).expect("choose direct");
    let precond = tree.find("Precond").expect("precond");
    tree.select_option(precond, "JACOBI").expect("select precond");
    let kind = tree.find("Limits/Kind").expect("kind");
    let hard = tree.find("Limits/Kind/Hard").expect("hard");
    tree.select_choice(kind, hard).expect("choose hard");
}
