//! Editing session: which template and tree are current, and whether they
//! were edited since the last save.

use paramtree_core::{
    load_profile_str, profile_xml, LoadSummary, ParameterTree, SerializeOptions, TreeError,
    TreeOptions, ValidityEvent,
};
use paramtree_xml::{TemplateModel, XmlError};
use tracing::{debug, info};

use crate::store::{ProfileStore, TemplateSource};
use crate::SessionError;

/// Generation token handed out before an asynchronous fetch.
///
/// Completions carrying a ticket from an older generation are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ticket {
    generation: u64,
}

impl Ticket {
    pub fn generation(&self) -> u64 {
        self.generation
    }
}

/// Explicit context for one user editing one tree at a time.
#[derive(Debug, Default)]
pub struct Session {
    generation: u64,
    pending: Option<String>,
    template: Option<TemplateModel>,
    tree: Option<ParameterTree>,
    profile: Option<String>,
    edited: bool,
    options: TreeOptions,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TreeOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Identifier of the installed template.
    pub fn template_id(&self) -> Option<&str> {
        self.template.as_ref().map(|template| template.id.as_str())
    }

    pub fn template(&self) -> Option<&TemplateModel> {
        self.template.as_ref()
    }

    pub fn tree(&self) -> Option<&ParameterTree> {
        self.tree.as_ref()
    }

    /// Name of the profile being edited, if one was loaded or saved.
    pub fn profile_name(&self) -> Option<&str> {
        self.profile.as_deref()
    }

    /// The tree changed since it was built, loaded or saved.
    pub fn is_edited(&self) -> bool {
        self.edited
    }

    /// The current tree is complete and may be submitted.
    pub fn ready(&self) -> bool {
        self.tree.as_ref().map_or(false, ParameterTree::is_complete)
    }

    /// Token for completions that belong to the current state.
    pub fn ticket(&self) -> Ticket {
        Ticket {
            generation: self.generation,
        }
    }

    /// Start switching to template `id`; earlier tickets become stale.
    pub fn begin_template(&mut self, id: &str) -> Ticket {
        self.generation += 1;
        self.pending = Some(id.to_string());
        debug!(template = id, generation = self.generation, "template requested");
        self.ticket()
    }

    /// Install a fetched template description if `ticket` is still current.
    pub fn install_template(&mut self, ticket: Ticket, xml: &str) -> Result<(), SessionError> {
        self.check(ticket)?;
        let mut model = paramtree_xml::parse(xml)?;
        if let Some(requested) = self.pending.take() {
            if model.id.is_empty() {
                model.id = requested;
            } else if model.id != requested {
                return Err(XmlError::Invalid(format!(
                    "requested template '{requested}' but received '{}'",
                    model.id
                ))
                .into());
            }
        }
        info!(template = %model.id, name = %model.name, "template installed");
        self.replace_tree(ParameterTree::from_template(&model, &self.options))?;
        self.template = Some(model);
        self.profile = None;
        self.edited = false;
        Ok(())
    }

    /// Fetch template `id` from `source` and make it current.
    pub async fn open_template<S>(&mut self, source: &S, id: &str) -> Result<(), SessionError>
    where
        S: TemplateSource + ?Sized,
    {
        let ticket = self.begin_template(id);
        let xml = source.fetch(id).await?;
        self.install_template(ticket, &xml)
    }

    /// Run a mutation against the current tree.
    ///
    /// The session is marked edited only when the mutation succeeds.
    pub fn edit<R, F>(&mut self, f: F) -> Result<R, SessionError>
    where
        F: FnOnce(&mut ParameterTree) -> Result<R, TreeError>,
    {
        let tree = self.tree.as_mut().ok_or(SessionError::NoTemplate)?;
        let value = f(tree)?;
        self.edited = true;
        Ok(value)
    }

    /// Watch the validity of the root node.
    ///
    /// The observer follows the session across template switches, profile
    /// loads and clears, and is told the root state of every new tree.
    pub fn observe_root<F>(&mut self, observer: F) -> Result<(), SessionError>
    where
        F: FnMut(&ValidityEvent) + Send + 'static,
    {
        let tree = self.tree.as_mut().ok_or(SessionError::NoTemplate)?;
        tree.observe(tree.root(), observer)?;
        Ok(())
    }

    /// Serialize the current tree.
    pub fn profile_xml(&self, options: &SerializeOptions) -> Result<String, SessionError> {
        let tree = self.tree.as_ref().ok_or(SessionError::NoTemplate)?;
        Ok(profile_xml(tree, options)?)
    }

    /// Rebuild the tree from the installed template, dropping all values.
    pub fn clear_profile(&mut self) -> Result<(), SessionError> {
        let template = self.template.as_ref().ok_or(SessionError::NoTemplate)?;
        debug!(template = %template.id, "profile cleared");
        let tree = ParameterTree::from_template(template, &self.options);
        self.replace_tree(tree)?;
        self.profile = None;
        self.edited = false;
        Ok(())
    }

    /// Replace the tree contents with a profile document if `ticket` is still current.
    pub fn apply_profile(
        &mut self,
        ticket: Ticket,
        name: &str,
        xml: &str,
    ) -> Result<LoadSummary, SessionError> {
        self.check(ticket)?;
        let template = self.template.as_ref().ok_or(SessionError::NoTemplate)?;
        let mut tree = ParameterTree::from_template(template, &self.options);
        let summary = load_profile_str(xml, &mut tree)?;
        info!(
            profile = name,
            matched = summary.matched,
            skipped = summary.skipped,
            "profile loaded"
        );
        self.replace_tree(tree)?;
        self.profile = Some(name.to_string());
        self.edited = false;
        Ok(summary)
    }

    /// Load profile `name` of the current template from `store`.
    pub async fn load_profile<S>(&mut self, store: &S, name: &str) -> Result<LoadSummary, SessionError>
    where
        S: ProfileStore + ?Sized,
    {
        let template = self.require_template_id()?;
        let ticket = self.ticket();
        let xml = store.load(&template, name).await?;
        self.apply_profile(ticket, name, &xml)
    }

    /// Save the current tree as `name`.
    ///
    /// Overwriting is only allowed for the profile currently being edited.
    pub async fn save_profile<S>(&mut self, store: &S, name: &str) -> Result<(), SessionError>
    where
        S: ProfileStore + ?Sized,
    {
        let template = self.require_template_id()?;
        let xml = self.profile_xml(&SerializeOptions::default())?;
        let overwrite = self.profile.as_deref() == Some(name);
        store.save(&template, name, xml, overwrite).await?;
        info!(template = %template, profile = name, overwrite, "profile saved");
        self.profile = Some(name.to_string());
        self.edited = false;
        Ok(())
    }

    pub async fn delete_profile<S>(&mut self, store: &S, name: &str) -> Result<(), SessionError>
    where
        S: ProfileStore + ?Sized,
    {
        let template = self.require_template_id()?;
        store.delete(&template, name).await?;
        if self.profile.as_deref() == Some(name) {
            self.profile = None;
        }
        Ok(())
    }

    pub async fn list_profiles<S>(&self, store: &S) -> Result<Vec<String>, SessionError>
    where
        S: ProfileStore + ?Sized,
    {
        let template = self.require_template_id()?;
        store.list(&template).await
    }

    /// Install `tree`, moving the root observers over from the previous tree
    /// and reporting the new root validity to them.
    fn replace_tree(&mut self, mut tree: ParameterTree) -> Result<(), TreeError> {
        let observers = match self.tree.as_mut() {
            Some(old) => old.take_observers(old.root()),
            None => Vec::new(),
        };
        let root = tree.root();
        let carried = !observers.is_empty();
        for observer in observers {
            tree.observe(root, observer)?;
        }
        if carried {
            tree.recompute_validity(root)?;
        }
        self.tree = Some(tree);
        Ok(())
    }

    fn require_template_id(&self) -> Result<String, SessionError> {
        self.template_id()
            .map(str::to_string)
            .ok_or(SessionError::NoTemplate)
    }

    fn check(&self, ticket: Ticket) -> Result<(), SessionError> {
        if ticket.generation != self.generation {
            debug!(
                ticket = ticket.generation,
                current = self.generation,
                "dropping stale completion"
            );
            return Err(SessionError::Stale {
                ticket: ticket.generation,
                current: self.generation,
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryProfileStore;
    use crate::Validity;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    const SOLVER: &str = r#"
        <Template Id="solver" Name="Solver settings">
            <Branch Name="SolverParams">
                <Leaf Name="Iterations" Type="xs:positiveInteger"
                      Restrictions='{"xs:maxInclusive": 10}' Default="5"/>
                <Leaf Name="Tolerance" Type="xs:double"/>
            </Branch>
        </Template>
    "#;

    const MESH: &str = r#"
        <Template Id="mesh">
            <Branch Name="MeshParams"><Leaf Name="Cells" Type="xs:integer"/></Branch>
        </Template>
    "#;

    struct FixedTemplates(HashMap<&'static str, &'static str>);

    impl FixedTemplates {
        fn new() -> Self {
            Self(HashMap::from([("solver", SOLVER), ("mesh", MESH)]))
        }
    }

    #[async_trait]
    impl TemplateSource for FixedTemplates {
        async fn fetch(&self, id: &str) -> Result<String, SessionError> {
            self.0
                .get(id)
                .map(|xml| xml.to_string())
                .ok_or_else(|| SessionError::TemplateNotFound(id.to_string()))
        }
    }

    #[tokio::test]
    async fn open_edit_save_and_reload() {
        let source = FixedTemplates::new();
        let store = MemoryProfileStore::new();
        let mut session = Session::new();
        session.open_template(&source, "solver").await.unwrap();
        assert_eq!(session.template_id(), Some("solver"));
        assert!(!session.ready());
        assert!(!session.is_edited());

        session
            .edit(|tree| {
                let tolerance = tree.find("Tolerance")?;
                tree.set_value(tolerance, "1e-8")
            })
            .unwrap();
        assert!(session.is_edited());
        assert!(session.ready());

        session.save_profile(&store, "tight").await.unwrap();
        assert!(!session.is_edited());
        assert_eq!(session.profile_name(), Some("tight"));
        session.save_profile(&store, "tight").await.unwrap();

        session.clear_profile().unwrap();
        assert!(!session.ready());
        assert_eq!(session.profile_name(), None);
        let err = session.save_profile(&store, "tight").await.unwrap_err();
        assert!(matches!(err, SessionError::ProfileExists(_)));

        let summary = session.load_profile(&store, "tight").await.unwrap();
        assert_eq!(summary.matched, 2);
        assert!(session.ready());
        assert_eq!(session.list_profiles(&store).await.unwrap(), ["tight"]);

        session.delete_profile(&store, "tight").await.unwrap();
        assert_eq!(session.profile_name(), None);
        assert!(session.list_profiles(&store).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn stale_template_completion_is_rejected() {
        let mut session = Session::new();
        let first = session.begin_template("solver");
        let second = session.begin_template("mesh");
        session.install_template(second, MESH).unwrap();

        assert_eq!((first.generation(), second.generation()), (1, 2));
        let err = session.install_template(first, SOLVER).unwrap_err();
        assert!(matches!(err, SessionError::Stale { ticket: 1, current: 2 }));
        assert_eq!(session.template_id(), Some("mesh"));
        let root = session.tree().unwrap().root();
        assert_eq!(session.tree().unwrap().node(root).unwrap().name(), "MeshParams");
    }

    #[tokio::test]
    async fn stale_profile_completion_is_rejected() {
        let source = FixedTemplates::new();
        let mut session = Session::new();
        session.open_template(&source, "solver").await.unwrap();
        let ticket = session.ticket();
        session.open_template(&source, "mesh").await.unwrap();
        let profile = "<SolverParams><Tolerance>1</Tolerance></SolverParams>";
        let err = session.apply_profile(ticket, "late", profile).unwrap_err();
        assert!(matches!(err, SessionError::Stale { .. }));
        assert_eq!(session.profile_name(), None);
    }

    #[tokio::test]
    async fn template_id_must_match_request() {
        let mut session = Session::new();
        let ticket = session.begin_template("mesh");
        let err = session.install_template(ticket, SOLVER).unwrap_err();
        assert!(matches!(err, SessionError::Xml(XmlError::Invalid(_))));
        assert!(session.tree().is_none());

        let err = session.open_template(&FixedTemplates::new(), "nope").await.unwrap_err();
        assert!(matches!(err, SessionError::TemplateNotFound(_)));
    }

    #[tokio::test]
    async fn failed_edit_leaves_session_unedited() {
        let mut session = Session::new();
        session.open_template(&FixedTemplates::new(), "solver").await.unwrap();
        let err = session
            .edit(|tree| {
                let iterations = tree.find("Iterations")?;
                tree.select_option(iterations, "FAST")
            })
            .unwrap_err();
        assert!(matches!(err, SessionError::Tree(_)));
        assert!(!session.is_edited());

        let err = session.edit(|tree| tree.find("Missing")).unwrap_err();
        assert!(matches!(err, SessionError::Tree(TreeError::Path(_))));
        assert!(!session.is_edited());
    }

    #[tokio::test]
    async fn root_observer_follows_tree_swaps() {
        let source = FixedTemplates::new();
        let store = MemoryProfileStore::new();
        let mut session = Session::new();
        session.open_template(&source, "solver").await.unwrap();
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        session
            .observe_root(move |event| sink.lock().unwrap().push(event.validity.clone()))
            .unwrap();

        let profile = "<SolverParams><Iterations>3</Iterations><Tolerance>0.1</Tolerance></SolverParams>";
        store.save("solver", "p", profile.to_string(), false).await.unwrap();
        session.load_profile(&store, "p").await.unwrap();
        assert!(session.ready());
        assert_eq!(events.lock().unwrap().as_slice(), [Validity::Valid]);

        session.clear_profile().unwrap();
        assert_eq!(events.lock().unwrap().last(), Some(&Validity::Unset));

        session.open_template(&source, "mesh").await.unwrap();
        session
            .edit(|tree| {
                let cells = tree.find("Cells")?;
                tree.set_value(cells, "12")
            })
            .unwrap();
        assert_eq!(
            events.lock().unwrap().as_slice(),
            [Validity::Valid, Validity::Unset, Validity::Unset, Validity::Valid]
        );
    }

    #[test]
    fn operations_need_a_template() {
        let mut session = Session::new();
        assert!(matches!(session.clear_profile(), Err(SessionError::NoTemplate)));
        assert!(matches!(
            session.profile_xml(&SerializeOptions::default()),
            Err(SessionError::NoTemplate)
        ));
        assert!(matches!(session.edit(|_| Ok(())), Err(SessionError::NoTemplate)));
        assert!(matches!(session.observe_root(|_| {}), Err(SessionError::NoTemplate)));
        assert!(!session.ready());
    }
}
