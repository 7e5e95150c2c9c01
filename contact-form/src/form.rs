use crate::{
    registry::{Button, Field, FieldRegistry, RegistryError},
    render::{FormOptions, RenderError, Renderer},
    security::{NonceSigner, SecurityHelper},
};

/// One configured contact form: its fields, its receiver and the security
/// keys derived from its identifier.
#[derive(Clone)]
pub struct ContactForm {
    id: String,
    receiver: String,
    options: FormOptions,
    registry: FieldRegistry,
    security: SecurityHelper,
}

impl ContactForm {
    pub fn new(id: impl Into<String>, receiver: impl Into<String>, signer: NonceSigner) -> Self {
        let id = id.into();
        Self {
            security: SecurityHelper::new(&id, signer),
            id,
            receiver: receiver.into(),
            options: FormOptions::default(),
            registry: FieldRegistry::new(),
        }
    }

    pub fn with_options(self, options: FormOptions) -> Self {
        Self { options, ..self }
    }

    pub fn add_field(&mut self, field: Field) -> Result<Field, RegistryError> {
        self.registry.add_field(field)
    }

    pub fn group_fields(&mut self, wrapper: impl Into<String>, fields: Vec<Field>) {
        self.registry.group_fields(wrapper, fields);
    }

    pub fn add_button(&mut self, button: Button) {
        self.registry.add_button(button);
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    pub fn registry(&self) -> &FieldRegistry {
        &self.registry
    }

    pub fn security(&self) -> &SecurityHelper {
        &self.security
    }

    pub fn render(&self, endpoint: &str) -> Result<String, RenderError> {
        Renderer::new(&self.id, &self.options, &self.registry, &self.security).render(endpoint)
    }
}
