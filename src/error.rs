/// Broad failure categories shared by the credential, session and registry errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Malformed or incomplete credential description
    Config,
    /// A referenced file (token, kubeconfig) could not be read
    Read,
    /// Credentials were valid but the session could not be established
    Connection,
    /// The cluster name is already registered
    Duplicate,
    /// The cluster name is not registered
    NotFound,
}
