use std::error::Error;

use async_trait::async_trait;
use paramtree::{render_text, MemoryProfileStore, Session, SessionError, TemplateSource};

const SOLVER: &str = r#"
    <Template Id="solver" Name="Solver settings">
        <Branch Name="SolverParams">
            <Leaf Name="Iterations" Type="xs:positiveInteger" Unit="true"
                  Restrictions='{"xs:maxInclusive": 10}' Default="5"/>
            <Branch Name="Output" Optional="true" MaxOccurs="unbounded">
                <Leaf Name="Path" Type="xs:file" Input="file" Restrictions='{"xs:filetype": ["xml"]}'/>
            </Branch>
            <Branch Name="Method" Choice="true">
                <Branch Name="Direct"><Leaf Name="Marker" Input="none"/></Branch>
                <Branch Name="Iterative"><Leaf Name="Tolerance" Type="xs:double"/></Branch>
            </Branch>
        </Branch>
    </Template>
"#;

struct Embedded;

#[async_trait]
impl TemplateSource for Embedded {
    async fn fetch(&self, id: &str) -> Result<String, SessionError> {
        match id {
            "solver" => Ok(SOLVER.to_string()),
            other => Err(SessionError::TemplateNotFound(other.to_string())),
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt::init();
    let store = MemoryProfileStore::new();
    let mut session = Session::new();
    session.open_template(&Embedded, "solver").await?;
    session.observe_root(|event| println!("root is now {}", event.validity))?;

    session.edit(|tree| -> Result<(), paramtree::TreeError> {
        let method = tree.find("Method")?;
        let iterative = tree.find("Method/Iterative")?;
        tree.select_choice(method, iterative)?;
        let tolerance = tree.find("Method/Iterative/Tolerance")?;
        tree.set_value(tolerance, "1e-8")?;
        let output = tree.find("Output")?;
        tree.set_enabled(output, true)?;
        tree.repeat(output)?;
        tree.set_value(tree.find("Output/Path")?, "mesh.xml")?;
        tree.set_value(tree.find("Output[1]/Path")?, "mesh.vtk")?;
        Ok(())
    })?;

    println!("{}", render_text(session.tree().ok_or(SessionError::NoTemplate)?));
    println!("ready: {}", session.ready());

    session.edit(|tree| -> Result<(), paramtree::TreeError> {
        tree.remove(tree.find("Output[1]")?)
    })?;
    println!("ready after removing the second output: {}", session.ready());

    session.save_profile(&store, "demo").await?;
    println!("{}", session.profile_xml(&Default::default())?);
    Ok(())
}
